use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use mindmuse_core::{
    ChatMessage, ConversationStore, ConversationSummary, MoodEntry, MoodStore, Transcript, UserKey,
};

/// Listing entry for a transcript. Empty transcripts sort last.
pub fn summarize(id: &str, transcript: &Transcript) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        title: transcript.title(),
        last_updated: transcript.last_updated().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    }
}

pub(crate) fn sort_newest_first(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated).then_with(|| a.id.cmp(&b.id)));
}

type UserConversations = HashMap<String, Transcript>;

/// Simple in-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, UserConversations>>,
    moods: RwLock<HashMap<String, BTreeMap<NaiveDate, MoodEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get(&self, user: &UserKey, conversation_id: &str) -> Result<Option<Transcript>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(user.as_str())
            .and_then(|c| c.get(conversation_id))
            .cloned())
    }

    async fn set(
        &self,
        user: &UserKey,
        conversation_id: &str,
        transcript: &Transcript,
    ) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(user.as_str().to_string())
            .or_default()
            .insert(conversation_id.to_string(), transcript.clone());
        Ok(())
    }

    async fn append(
        &self,
        user: &UserKey,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(user.as_str().to_string())
            .or_default()
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn delete(&self, user: &UserKey, conversation_id: &str) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        if let Some(user_conversations) = conversations.get_mut(user.as_str()) {
            user_conversations.remove(conversation_id);
        }
        Ok(())
    }

    async fn list_all(&self, user: &UserKey) -> Result<Vec<ConversationSummary>> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .get(user.as_str())
            .map(|c| c.iter().map(|(id, t)| summarize(id, t)).collect())
            .unwrap_or_default();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}

#[async_trait]
impl MoodStore for InMemoryStore {
    async fn record(&self, user: &UserKey, entry: MoodEntry) -> Result<()> {
        let mut moods = self.moods.write().await;
        moods
            .entry(user.as_str().to_string())
            .or_default()
            .insert(entry.date, entry);
        Ok(())
    }

    async fn history(&self, user: &UserKey) -> Result<Vec<MoodEntry>> {
        let moods = self.moods.read().await;
        Ok(moods
            .get(user.as_str())
            .map(|m| m.values().rev().cloned().collect())
            .unwrap_or_default())
    }
}
