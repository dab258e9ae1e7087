//! MindMuse configuration schema.
//!
//! Every field is optional in the file; [`crate::defaults`] fills the gaps
//! after loading. Keys are camelCase in YAML.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use mindmuse_core::{ResponseStyle, Settings, SettingsProvider, DEFAULT_CONTEXT_WINDOW};

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_REFERER: &str = "https://mindmuseai.app";
pub const DEFAULT_TITLE: &str = "MindMuseAI";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMuseConfig {
    /// Chat-completion endpoint and credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    /// User preferences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsConfig>,

    /// Where conversations and moods are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Sent as `HTTP-Referer`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Sent as `X-Title`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Prior messages sent with each request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_style: Option<ResponseStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_enabled: Option<bool>,
    /// Program that reads reply text on stdin and speaks it (e.g. `espeak`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_command: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database, mirrored into the local cache for signed-in users
    #[default]
    Sqlite,
    /// JSON cache file only
    Local,
    /// Nothing survives the process
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Local => "local",
            StorageBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<StorageBackend>,
    /// SQLite database file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// JSON cache file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    /// Signed-in user id; absent means anonymous
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for the daily NDJSON log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_sensitive: Option<bool>,
}

// ---------------------------------------------------------------------------
// Accessors with fallbacks
// ---------------------------------------------------------------------------

impl MindMuseConfig {
    fn provider_field<T>(&self, f: impl FnOnce(&ProviderConfig) -> Option<T>) -> Option<T> {
        self.provider.as_ref().and_then(f)
    }

    pub fn endpoint(&self) -> String {
        self.provider_field(|p| p.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    /// The API key, if one is configured and not blank.
    pub fn api_key(&self) -> Option<String> {
        self.provider_field(|p| p.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn referer(&self) -> String {
        self.provider_field(|p| p.referer.clone())
            .unwrap_or_else(|| DEFAULT_REFERER.to_string())
    }

    pub fn title(&self) -> String {
        self.provider_field(|p| p.title.clone())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }

    pub fn context_window(&self) -> usize {
        self.provider_field(|p| p.context_window)
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.provider_field(|p| p.request_timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn voice_command(&self) -> Option<String> {
        self.settings.as_ref().and_then(|s| s.voice_command.clone())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage
            .as_ref()
            .and_then(|s| s.backend)
            .unwrap_or_default()
    }

    pub fn user_id(&self) -> Option<String> {
        self.storage
            .as_ref()
            .and_then(|s| s.user_id.clone())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn log_level(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn redact_sensitive(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.redact_sensitive)
            .unwrap_or(true)
    }
}

impl SettingsProvider for MindMuseConfig {
    fn settings(&self) -> Settings {
        let defaults = Settings::default();
        let Some(s) = &self.settings else {
            return defaults;
        };
        Settings {
            model: s.model.clone().unwrap_or(defaults.model),
            response_style: s.response_style.unwrap_or(defaults.response_style),
            voice_enabled: s.voice_enabled.unwrap_or(defaults.voice_enabled),
        }
    }
}
