//! Primary store with a local cache in front of it.
//!
//! Signed-in users write to both and read from the primary first, falling
//! back to the cache when the primary fails or has nothing. Anonymous users
//! only ever touch the cache.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use mindmuse_core::{
    ChatMessage, ConversationStore, ConversationSummary, MoodEntry, MoodStore, Transcript, UserKey,
};

pub struct LayeredStore<P, C> {
    primary: P,
    cache: C,
}

impl<P, C> LayeredStore<P, C> {
    pub fn new(primary: P, cache: C) -> Self {
        Self { primary, cache }
    }
}

/// Write to the primary and the cache. Succeeds if either write does.
async fn write_both<A, B>(what: &str, primary: A, cache: B) -> Result<()>
where
    A: std::future::Future<Output = Result<()>>,
    B: std::future::Future<Output = Result<()>>,
{
    let primary = primary.await;
    let cache = cache.await;
    match (primary, cache) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => {
            warn!(error = %e, "primary store {what} failed; kept in local cache only");
            Ok(())
        }
        (Ok(()), Err(e)) => {
            warn!(error = %e, "local cache {what} failed");
            Ok(())
        }
        (Err(e), Err(cache_err)) => {
            warn!(error = %cache_err, "local cache {what} failed");
            Err(e)
        }
    }
}

#[async_trait]
impl<P, C> ConversationStore for LayeredStore<P, C>
where
    P: ConversationStore,
    C: ConversationStore,
{
    async fn get(&self, user: &UserKey, conversation_id: &str) -> Result<Option<Transcript>> {
        if !user.is_signed_in() {
            return self.cache.get(user, conversation_id).await;
        }
        match self.primary.get(user, conversation_id).await {
            Ok(Some(transcript)) => Ok(Some(transcript)),
            Ok(None) => self.cache.get(user, conversation_id).await,
            Err(e) => {
                warn!(error = %e, conversation_id, "primary store read failed; using local cache");
                self.cache.get(user, conversation_id).await
            }
        }
    }

    async fn set(
        &self,
        user: &UserKey,
        conversation_id: &str,
        transcript: &Transcript,
    ) -> Result<()> {
        if !user.is_signed_in() {
            return self.cache.set(user, conversation_id, transcript).await;
        }
        write_both(
            "write",
            self.primary.set(user, conversation_id, transcript),
            self.cache.set(user, conversation_id, transcript),
        )
        .await
    }

    async fn append(
        &self,
        user: &UserKey,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<()> {
        if !user.is_signed_in() {
            return self.cache.append(user, conversation_id, message).await;
        }
        write_both(
            "append",
            self.primary.append(user, conversation_id, message),
            self.cache.append(user, conversation_id, message),
        )
        .await
    }

    async fn delete(&self, user: &UserKey, conversation_id: &str) -> Result<()> {
        if !user.is_signed_in() {
            return self.cache.delete(user, conversation_id).await;
        }
        write_both(
            "delete",
            self.primary.delete(user, conversation_id),
            self.cache.delete(user, conversation_id),
        )
        .await
    }

    async fn list_all(&self, user: &UserKey) -> Result<Vec<ConversationSummary>> {
        if !user.is_signed_in() {
            return self.cache.list_all(user).await;
        }
        match self.primary.list_all(user).await {
            Ok(list) => Ok(list),
            Err(e) => {
                warn!(error = %e, "primary store listing failed; using local cache");
                self.cache.list_all(user).await
            }
        }
    }
}

#[async_trait]
impl<P, C> MoodStore for LayeredStore<P, C>
where
    P: MoodStore,
    C: MoodStore,
{
    async fn record(&self, user: &UserKey, entry: MoodEntry) -> Result<()> {
        if !user.is_signed_in() {
            return self.cache.record(user, entry).await;
        }
        write_both(
            "mood record",
            self.primary.record(user, entry.clone()),
            self.cache.record(user, entry),
        )
        .await
    }

    async fn history(&self, user: &UserKey) -> Result<Vec<MoodEntry>> {
        if !user.is_signed_in() {
            return self.cache.history(user).await;
        }
        match self.primary.history(user).await {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!(error = %e, "primary store mood read failed; using local cache");
                self.cache.history(user).await
            }
        }
    }
}
