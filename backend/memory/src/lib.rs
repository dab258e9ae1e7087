//! Persistence collaborators: conversations and mood history.
//!
//! - [`InMemoryStore`]: ephemeral, for tests and the `memory` backend.
//! - [`SqliteStore`]: durable document store (`conversations`, `messages`, `moods`).
//! - [`LocalCacheStore`]: single JSON file, capped per conversation.
//! - [`LayeredStore`]: primary + cache, chosen per user.

pub mod layered;
pub mod local_cache;
pub mod sqlite_store;
pub mod store;

pub use layered::LayeredStore;
pub use local_cache::{LocalCacheStore, MAX_CACHED_MESSAGES};
pub use sqlite_store::SqliteStore;
pub use store::{summarize, InMemoryStore};
