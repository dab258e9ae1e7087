//! `mindmuse-config` — MindMuse runtime configuration.
//!
//! Provides:
//! - Typed config schema (provider, settings, storage, logging)
//! - YAML read/write with atomic backup rotation
//! - `${ENV_VAR}` substitution and environment overrides
//! - Config redaction for safe display
//! - Default value application
//! - Validation with field paths

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    apply_env_overrides_with, collect_referenced_vars, resolve_env_vars, resolve_env_vars_with,
    MissingEnvVarError, API_KEY_ENV, MODEL_ENV,
};
pub use io::{config_dir, config_file_path, expand_home, load_config, write_config};
pub use redact::{collect_redacted_paths, mask_secret, redact};
pub use schema::{
    LoggingConfig, MindMuseConfig, ProviderConfig, SettingsConfig, StorageBackend, StorageConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Load a config file, substitute env vars, apply overrides and defaults, then validate.
///
/// This is the main entry point for loading a config at runtime.
pub async fn load_and_prepare(path: &Path) -> Result<MindMuseConfig> {
    load_and_prepare_with(path, &std::env::vars().collect()).await
}

/// [`load_and_prepare`] against an explicit environment.
///
/// Validation warnings are logged; validation errors fail the load.
pub async fn load_and_prepare_with(
    path: &Path,
    env: &HashMap<String, String>,
) -> Result<MindMuseConfig> {
    let raw_config = load_config(path).await?;

    let value: Value =
        serde_json::to_value(&raw_config).context("Failed to serialize config for processing")?;
    let value = resolve_env_vars_with(&value, env).context("Failed to resolve env vars in config")?;
    let config: MindMuseConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;

    let config = apply_env_overrides_with(config, env);
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let config = apply_all_defaults(config, base_dir);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.first() {
        bail!("{first} ({} error(s) in {})", report.errors.len(), path.display());
    }

    Ok(config)
}
