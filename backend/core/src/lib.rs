//! `mindmuse-core` — shared vocabulary for the MindMuse companion.
//!
//! Chat messages and transcripts, the streaming error taxonomy, the events a
//! turn emits, and the collaborator traits (storage, identity, settings,
//! speech) the rest of the workspace is written against.

pub mod error;
pub mod event;
pub mod message;
pub mod traits;
pub mod types;

pub use error::{StreamError, StreamErrorKind};
pub use event::{StreamEvent, StreamState, TextFragment};
pub use message::{
    ChatMessage, ContentPart, ImageRef, MessageContent, Role, Transcript, DEFAULT_CONTEXT_WINDOW,
    UNTITLED,
};
pub use traits::{
    ConversationStore, IdentityProvider, MoodStore, SettingsProvider, SpeechSynthesizer,
    StaticIdentity, TurnObserver,
};
pub use types::{
    ConversationSummary, MoodEntry, MoodPeriod, MoodStatistics, ResponseStyle, Settings, UserKey,
};
