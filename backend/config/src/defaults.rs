//! Config defaults: fill every unset field after loading.

use std::path::Path;

use mindmuse_core::{ResponseStyle, DEFAULT_CONTEXT_WINDOW};

use crate::io::expand_home;
use crate::schema::{
    LoggingConfig, MindMuseConfig, ProviderConfig, SettingsConfig, StorageBackend, StorageConfig,
    DEFAULT_ENDPOINT, DEFAULT_LOG_LEVEL, DEFAULT_REFERER, DEFAULT_TIMEOUT_SECS, DEFAULT_TITLE,
};

pub const DEFAULT_DB_FILE: &str = "mindmuse.db";
pub const DEFAULT_CACHE_FILE: &str = "cache.json";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Apply all defaults. Relative file locations are resolved against `config_dir`.
pub fn apply_all_defaults(config: MindMuseConfig, config_dir: &Path) -> MindMuseConfig {
    let config = apply_provider_defaults(config);
    let config = apply_settings_defaults(config);
    let config = apply_storage_defaults(config, config_dir);
    apply_logging_defaults(config, config_dir)
}

fn apply_provider_defaults(mut config: MindMuseConfig) -> MindMuseConfig {
    let provider = config.provider.get_or_insert_with(ProviderConfig::default);
    provider.endpoint.get_or_insert_with(|| DEFAULT_ENDPOINT.to_string());
    provider.referer.get_or_insert_with(|| DEFAULT_REFERER.to_string());
    provider.title.get_or_insert_with(|| DEFAULT_TITLE.to_string());
    provider.context_window.get_or_insert(DEFAULT_CONTEXT_WINDOW);
    provider.request_timeout_secs.get_or_insert(DEFAULT_TIMEOUT_SECS);
    config
}

fn apply_settings_defaults(mut config: MindMuseConfig) -> MindMuseConfig {
    let settings = config.settings.get_or_insert_with(SettingsConfig::default);
    settings
        .model
        .get_or_insert_with(|| mindmuse_core::types::DEFAULT_MODEL.to_string());
    settings.response_style.get_or_insert(ResponseStyle::default());
    settings.voice_enabled.get_or_insert(false);
    config
}

fn apply_storage_defaults(mut config: MindMuseConfig, config_dir: &Path) -> MindMuseConfig {
    let storage = config.storage.get_or_insert_with(StorageConfig::default);
    storage.backend.get_or_insert(StorageBackend::default());
    storage.path = Some(resolve(storage.path.take(), config_dir, DEFAULT_DB_FILE));
    storage.cache_path = Some(resolve(storage.cache_path.take(), config_dir, DEFAULT_CACHE_FILE));
    config
}

fn apply_logging_defaults(mut config: MindMuseConfig, config_dir: &Path) -> MindMuseConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.dir = Some(resolve(logging.dir.take(), config_dir, DEFAULT_LOG_DIR));
    logging.redact_sensitive.get_or_insert(true);
    config
}

fn resolve(
    configured: Option<std::path::PathBuf>,
    config_dir: &Path,
    default_name: &str,
) -> std::path::PathBuf {
    match configured {
        Some(path) => {
            let path = expand_home(&path);
            if path.is_relative() {
                config_dir.join(path)
            } else {
                path
            }
        }
        None => config_dir.join(default_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn fills_every_section() {
        let cfg = apply_all_defaults(MindMuseConfig::default(), Path::new("/etc/mindmuse"));
        let provider = cfg.provider.as_ref().unwrap();
        assert_eq!(provider.endpoint.as_deref(), Some(DEFAULT_ENDPOINT));
        assert_eq!(provider.context_window, Some(10));
        assert_eq!(
            cfg.storage.as_ref().unwrap().path,
            Some(PathBuf::from("/etc/mindmuse/mindmuse.db"))
        );
        assert_eq!(
            cfg.logging.as_ref().unwrap().dir,
            Some(PathBuf::from("/etc/mindmuse/logs"))
        );
        assert_eq!(cfg.settings.as_ref().unwrap().voice_enabled, Some(false));
    }

    #[test]
    fn keeps_user_values_and_resolves_relative_paths() {
        let mut cfg = MindMuseConfig::default();
        cfg.provider = Some(ProviderConfig {
            context_window: Some(4),
            ..Default::default()
        });
        cfg.storage = Some(StorageConfig {
            path: Some(PathBuf::from("data/chat.db")),
            cache_path: Some(PathBuf::from("/tmp/cache.json")),
            ..Default::default()
        });
        let cfg = apply_all_defaults(cfg, Path::new("/home/sam/.mindmuse"));
        assert_eq!(cfg.context_window(), 4);
        let storage = cfg.storage.unwrap();
        assert_eq!(storage.path, Some(PathBuf::from("/home/sam/.mindmuse/data/chat.db")));
        assert_eq!(storage.cache_path, Some(PathBuf::from("/tmp/cache.json")));
    }
}
