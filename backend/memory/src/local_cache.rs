//! Local JSON cache for conversations and moods.
//!
//! The whole cache is one file, rewritten atomically (temp file + rename) on
//! every change. Each conversation keeps only its most recent
//! [`MAX_CACHED_MESSAGES`] messages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use mindmuse_core::{
    ChatMessage, ConversationStore, ConversationSummary, MoodEntry, MoodStore, Transcript, UserKey,
};

use crate::store::{sort_newest_first, summarize};

pub const MAX_CACHED_MESSAGES: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    /// user key -> conversation id -> transcript
    #[serde(default)]
    chat_history: BTreeMap<String, BTreeMap<String, Transcript>>,
    /// user key -> date -> entry
    #[serde(default)]
    moods: BTreeMap<String, BTreeMap<NaiveDate, MoodEntry>>,
}

pub struct LocalCacheStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl LocalCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<CacheFile> {
        if !self.path.exists() {
            return Ok(CacheFile::default());
        }
        let raw = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read cache file: {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(CacheFile::default());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse cache file: {}", self.path.display()))
    }

    async fn save(&self, cache: &CacheFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_vec_pretty(cache).context("Failed to serialize cache")?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)
            .await
            .with_context(|| format!("Failed to write temp cache: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).await.with_context(|| {
            format!("Failed to rename temp cache to: {}", self.path.display())
        })?;
        debug!(path = %self.path.display(), bytes = json.len(), "wrote local cache");
        Ok(())
    }

    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut CacheFile) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut cache = self.load().await?;
        change(&mut cache);
        self.save(&cache).await
    }
}

#[async_trait]
impl ConversationStore for LocalCacheStore {
    async fn get(&self, user: &UserKey, conversation_id: &str) -> Result<Option<Transcript>> {
        let _guard = self.lock.lock().await;
        let mut cache = self.load().await?;
        Ok(cache
            .chat_history
            .get_mut(user.as_str())
            .and_then(|c| c.remove(conversation_id)))
    }

    async fn set(
        &self,
        user: &UserKey,
        conversation_id: &str,
        transcript: &Transcript,
    ) -> Result<()> {
        let mut transcript = transcript.clone();
        transcript.retain_last(MAX_CACHED_MESSAGES);
        self.update(|cache| {
            cache
                .chat_history
                .entry(user.as_str().to_string())
                .or_default()
                .insert(conversation_id.to_string(), transcript);
        })
        .await
    }

    async fn append(
        &self,
        user: &UserKey,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<()> {
        self.update(|cache| {
            let transcript = cache
                .chat_history
                .entry(user.as_str().to_string())
                .or_default()
                .entry(conversation_id.to_string())
                .or_default();
            transcript.push(message.clone());
            transcript.retain_last(MAX_CACHED_MESSAGES);
        })
        .await
    }

    async fn delete(&self, user: &UserKey, conversation_id: &str) -> Result<()> {
        self.update(|cache| {
            if let Some(conversations) = cache.chat_history.get_mut(user.as_str()) {
                conversations.remove(conversation_id);
            }
        })
        .await
    }

    async fn list_all(&self, user: &UserKey) -> Result<Vec<ConversationSummary>> {
        let _guard = self.lock.lock().await;
        let cache = self.load().await?;
        let mut summaries: Vec<ConversationSummary> = cache
            .chat_history
            .get(user.as_str())
            .map(|c| c.iter().map(|(id, t)| summarize(id, t)).collect())
            .unwrap_or_default();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}

#[async_trait]
impl MoodStore for LocalCacheStore {
    async fn record(&self, user: &UserKey, entry: MoodEntry) -> Result<()> {
        self.update(|cache| {
            cache
                .moods
                .entry(user.as_str().to_string())
                .or_default()
                .insert(entry.date, entry);
        })
        .await
    }

    async fn history(&self, user: &UserKey) -> Result<Vec<MoodEntry>> {
        let _guard = self.lock.lock().await;
        let mut cache = self.load().await?;
        Ok(cache
            .moods
            .remove(user.as_str())
            .map(|m| m.into_values().rev().collect())
            .unwrap_or_default())
    }
}
