//! Structured logging for MindMuse.
//!
//! Subscriber setup with a daily NDJSON file, redaction of secrets and phone
//! numbers, and conversation-level events.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{ConversationEvent, ConversationEventLogger, EventLogEntry, EVENT_TARGET};
pub use logger::{LOG_FILE_PREFIX, init_logger};
pub use redact::redact_sensitive_data;
