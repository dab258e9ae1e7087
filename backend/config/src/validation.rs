//! Config validation with field paths in every message.

use crate::schema::MindMuseConfig;
use thiserror::Error;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Everything found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

pub fn validate(config: &MindMuseConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_provider(config, &mut report);
    validate_settings(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_provider(config: &MindMuseConfig, report: &mut ValidationReport) {
    if config.api_key().is_none() {
        report.warn(
            "provider.apiKey",
            "No API key configured; replies will use the offline fallback",
        );
    }
    let Some(provider) = &config.provider else { return };
    if let Some(endpoint) = &provider.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            report.error("provider.endpoint", format!("'{endpoint}' is not an http(s) URL"));
        }
    }
    if provider.context_window == Some(0) {
        report.error("provider.contextWindow", "contextWindow must be >= 1");
    }
    if provider.request_timeout_secs == Some(0) {
        report.error("provider.requestTimeoutSecs", "requestTimeoutSecs must be > 0");
    }
}

fn validate_settings(config: &MindMuseConfig, report: &mut ValidationReport) {
    let Some(settings) = &config.settings else { return };
    if settings.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
        report.error("settings.model", "Model id cannot be empty");
    }
    if settings.voice_enabled == Some(true) && settings.voice_command.is_none() {
        report.warn(
            "settings.voiceCommand",
            "Voice is enabled but no voiceCommand is set; replies will not be spoken",
        );
    }
}

fn validate_logging(config: &MindMuseConfig, report: &mut ValidationReport) {
    let Some(level) = config.logging.as_ref().and_then(|l| l.level.as_deref()) else {
        return;
    };
    if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        report.error(
            "logging.level",
            format!("Unknown log level '{level}'. Use one of: {}", LOG_LEVELS.join(", ")),
        );
    }
}
