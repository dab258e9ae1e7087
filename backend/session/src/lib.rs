//! MindMuse conversation sessions.
//!
//! A [`ConversationSession`] owns one transcript and runs turns against a
//! [`ReplyProvider`](mindmuse_stream::ReplyProvider): persist the user
//! message, stream the reply to observers, fall back to a canned answer on
//! failure, persist the assistant message.

pub mod fallback;
pub mod observer;
pub mod session;
pub mod system_prompt;

pub use fallback::FallbackPolicy;
pub use observer::{LoggingObserver, SpeechObserver};
pub use session::{ConversationSession, TurnContext, TurnOutcome, GREETING};
pub use system_prompt::PromptBuilder;
