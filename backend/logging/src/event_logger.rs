//! Conversation event logger
//!
//! User messages, replies, fallbacks and mood entries written as structured
//! events under the `conversation_events` target.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use mindmuse_core::{MoodEntry, StreamErrorKind, StreamEvent, TurnObserver};

use crate::redact::redact_sensitive_data;

pub const EVENT_TARGET: &str = "conversation_events";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    UserMessage { content: String },
    AssistantReply { content: String },
    Fallback { kind: StreamErrorKind, content: String },
    MoodRecorded { mood: String, note: Option<String> },
}

impl ConversationEvent {
    pub fn mood(entry: &MoodEntry) -> Self {
        ConversationEvent::MoodRecorded {
            mood: entry.mood.clone(),
            note: entry.note.clone(),
        }
    }

    fn redact(&mut self) {
        match self {
            ConversationEvent::UserMessage { content }
            | ConversationEvent::AssistantReply { content }
            | ConversationEvent::Fallback { content, .. } => {
                *content = redact_sensitive_data(content);
            }
            ConversationEvent::MoodRecorded { note, .. } => {
                if let Some(note) = note {
                    *note = redact_sensitive_data(note);
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ConversationEvent,
}

/// Writes conversation events to the tracing system as JSON.
#[derive(Debug, Clone, Copy)]
pub struct ConversationEventLogger {
    redact: bool,
}

impl Default for ConversationEventLogger {
    fn default() -> Self {
        Self { redact: true }
    }
}

impl ConversationEventLogger {
    pub fn new(redact: bool) -> Self {
        Self { redact }
    }

    /// Build the entry that [`log_event`](Self::log_event) writes.
    pub fn entry(&self, conversation_id: &str, mut event: ConversationEvent) -> EventLogEntry {
        if self.redact {
            event.redact();
        }
        EventLogEntry {
            conversation_id: conversation_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn log_event(&self, conversation_id: &str, event: ConversationEvent) {
        let entry = self.entry(conversation_id, event);
        match serde_json::to_string(&entry) {
            Ok(json) => info!(target: EVENT_TARGET, event = %json, "conversation event"),
            Err(e) => info!(target: EVENT_TARGET, event = ?entry, error = %e, "conversation event"),
        }
    }
}

#[async_trait]
impl TurnObserver for ConversationEventLogger {
    async fn on_event(&self, conversation_id: &str, event: &StreamEvent) {
        let event = match event {
            StreamEvent::Update { .. } => return,
            StreamEvent::Complete { text } => ConversationEvent::AssistantReply {
                content: text.clone(),
            },
            StreamEvent::Failed { kind, fallback } => ConversationEvent::Fallback {
                kind: *kind,
                content: fallback.clone(),
            },
        };
        self.log_event(conversation_id, event);
    }
}
