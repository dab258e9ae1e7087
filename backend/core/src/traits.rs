use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::event::StreamEvent;
use crate::message::{ChatMessage, Transcript};
use crate::types::{ConversationSummary, MoodEntry, MoodPeriod, MoodStatistics, Settings, UserKey};

/// Conversation persistence, keyed by user and conversation id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a full transcript, or `None` if the conversation does not exist.
    async fn get(&self, user: &UserKey, conversation_id: &str) -> Result<Option<Transcript>>;

    /// Replace a conversation's transcript, creating it if needed.
    async fn set(&self, user: &UserKey, conversation_id: &str, transcript: &Transcript)
        -> Result<()>;

    /// Append one message, creating the conversation if needed.
    async fn append(&self, user: &UserKey, conversation_id: &str, message: &ChatMessage)
        -> Result<()>;

    /// Delete a conversation. Deleting a missing conversation is not an error.
    async fn delete(&self, user: &UserKey, conversation_id: &str) -> Result<()>;

    /// All conversations of a user, most recently updated first.
    async fn list_all(&self, user: &UserKey) -> Result<Vec<ConversationSummary>>;
}

/// Mood history persistence.
#[async_trait]
pub trait MoodStore: Send + Sync {
    /// Record a mood; replaces any entry already stored for the same date.
    async fn record(&self, user: &UserKey, entry: MoodEntry) -> Result<()>;

    /// Full history, newest first.
    async fn history(&self, user: &UserKey) -> Result<Vec<MoodEntry>>;

    async fn history_for(
        &self,
        user: &UserKey,
        period: MoodPeriod,
        today: NaiveDate,
    ) -> Result<Vec<MoodEntry>> {
        let entries = self.history(user).await?;
        Ok(entries
            .into_iter()
            .filter(|e| period.contains(e.date, today))
            .collect())
    }

    async fn statistics(&self, user: &UserKey, today: NaiveDate) -> Result<MoodStatistics> {
        let entries = self.history(user).await?;
        Ok(MoodStatistics::compute(&entries, today))
    }
}

/// Who is using the companion right now.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<String>;

    fn user_key(&self) -> UserKey {
        UserKey::from_identity(self.current_user())
    }
}

/// Identity fixed at startup (from config), or anonymous.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_id: Option<String>) -> Self {
        Self { user_id }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<String> {
        self.user_id.clone()
    }
}

/// Source of user preferences. Implementations fall back to [`Settings::default`].
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> Settings;
}

impl SettingsProvider for Settings {
    fn settings(&self) -> Settings {
        self.clone()
    }
}

/// Text-to-speech capability, treated as a black box.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Subscriber to the events of a turn (UI, speech, logging).
#[async_trait]
pub trait TurnObserver: Send + Sync {
    async fn on_event(&self, conversation_id: &str, event: &StreamEvent);
}
