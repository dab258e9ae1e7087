//! Runtime wiring: prepared config to stores, identity and request defaults.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use mindmuse_config::{MindMuseConfig, StorageBackend};
use mindmuse_core::{
    ConversationStore, IdentityProvider, MoodStore, Settings, SettingsProvider, StaticIdentity,
    UserKey,
};
use mindmuse_logging::ConversationEventLogger;
use mindmuse_memory::{InMemoryStore, LayeredStore, LocalCacheStore, SqliteStore};
use mindmuse_stream::RequestConfig;

/// Conversation and mood storage behind one backend.
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub moods: Arc<dyn MoodStore>,
}

impl Stores {
    fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: ConversationStore + MoodStore + 'static,
    {
        Self {
            conversations: store.clone(),
            moods: store,
        }
    }
}

pub struct App {
    pub config: MindMuseConfig,
    pub user: UserKey,
    pub stores: Stores,
    pub events: ConversationEventLogger,
}

impl App {
    pub fn build(config: MindMuseConfig, config_path: &Path) -> Result<Self> {
        let stores = build_stores(&config, config_dir_of(config_path))?;
        let user = StaticIdentity::new(config.user_id()).user_key();
        let events = ConversationEventLogger::new(config.redact_sensitive());
        info!(
            backend = config.storage_backend().as_str(),
            signed_in = user.is_signed_in(),
            "MindMuse ready"
        );
        Ok(Self {
            config,
            user,
            stores,
            events,
        })
    }

    pub fn settings(&self) -> Settings {
        self.config.settings()
    }

    /// How long the reply body may stall before the turn gives up.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs())
    }

    /// Request defaults shared by every turn; sessions add model and style.
    pub fn base_request(&self) -> RequestConfig {
        base_request(&self.config)
    }
}

pub fn base_request(config: &MindMuseConfig) -> RequestConfig {
    let settings = config.settings();
    let request = RequestConfig::new(settings.model, config.endpoint())
        .with_identification(config.referer(), config.title())
        .with_context_window(config.context_window());
    match config.api_key() {
        Some(key) => request.with_auth_token(key),
        None => request,
    }
}

fn config_dir_of(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new("."))
}

/// Open the configured backend. File locations are normally filled in by
/// the config defaults; `config_dir` covers configs built without them.
pub fn build_stores(config: &MindMuseConfig, config_dir: &Path) -> Result<Stores> {
    let storage = config.storage.clone().unwrap_or_default();
    let db_path = storage
        .path
        .unwrap_or_else(|| config_dir.join(mindmuse_config::defaults::DEFAULT_DB_FILE));
    let cache_path = storage
        .cache_path
        .unwrap_or_else(|| config_dir.join(mindmuse_config::defaults::DEFAULT_CACHE_FILE));

    let stores = match config.storage_backend() {
        StorageBackend::Sqlite => {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data directory: {}", parent.display())
                })?;
            }
            let primary = SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
            Stores::from_shared(Arc::new(LayeredStore::new(
                primary,
                LocalCacheStore::new(cache_path),
            )))
        }
        StorageBackend::Local => Stores::from_shared(Arc::new(LocalCacheStore::new(cache_path))),
        StorageBackend::Memory => Stores::from_shared(Arc::new(InMemoryStore::new())),
    };
    Ok(stores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindmuse_config::{ProviderConfig, StorageConfig};
    use mindmuse_core::{ChatMessage, MoodEntry};

    #[test]
    fn base_request_carries_provider_settings() {
        let config = MindMuseConfig {
            provider: Some(ProviderConfig {
                api_key: Some("sk-or-test".into()),
                context_window: Some(4),
                request_timeout_secs: Some(30),
                ..Default::default()
            }),
            ..Default::default()
        };
        let request = base_request(&config);
        assert_eq!(request.auth_token().unwrap(), "sk-or-test");
        assert_eq!(request.context_window, 4);
        assert_eq!(request.referer, mindmuse_stream::config::DEFAULT_REFERER);

        assert!(base_request(&MindMuseConfig::default()).auth_token().is_err());
    }

    #[test]
    fn read_timeout_comes_from_request_timeout_secs() {
        let config = MindMuseConfig {
            provider: Some(ProviderConfig {
                request_timeout_secs: Some(30),
                ..Default::default()
            }),
            storage: Some(StorageConfig {
                backend: Some(StorageBackend::Memory),
                ..Default::default()
            }),
            ..Default::default()
        };
        let app = App::build(config, Path::new("config.yaml")).unwrap();
        assert_eq!(app.read_timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn sqlite_backend_shares_one_store_for_both_roles() {
        let dir = tempfile::tempdir().unwrap();
        let config = MindMuseConfig {
            storage: Some(StorageConfig {
                user_id: Some("uid-1".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let stores = build_stores(&config, dir.path()).unwrap();
        let user = UserKey::Signed("uid-1".into());

        stores
            .conversations
            .append(&user, "chat_1", &ChatMessage::user("hello"))
            .await
            .unwrap();
        stores.moods.record(&user, MoodEntry::now("calm", None)).await.unwrap();

        assert!(dir.path().join("mindmuse.db").exists());
        assert!(dir.path().join("cache.json").exists());
        assert_eq!(stores.moods.history(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn memory_backend_touches_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = MindMuseConfig {
            storage: Some(StorageConfig {
                backend: Some(StorageBackend::Memory),
                ..Default::default()
            }),
            ..Default::default()
        };
        let stores = build_stores(&config, dir.path()).unwrap();
        stores
            .conversations
            .append(&UserKey::Anonymous, "c", &ChatMessage::user("hi"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
