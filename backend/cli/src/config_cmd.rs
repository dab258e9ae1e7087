//! CLI config subcommands.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use mindmuse_config::{load_and_prepare, load_config, mask_secret, redact, write_config, ProviderConfig};

use crate::terminal_output::note_success;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective config with secrets masked
    Show,
    /// Print the config file location
    Path,
    /// Store the OpenRouter API key in the config file
    SetApiKey { key: String },
}

/// Effective config as YAML, secrets masked.
pub async fn show(path: &Path) -> Result<String> {
    let config = load_and_prepare(path).await?;
    let value = serde_json::to_value(&config).context("Failed to serialize config")?;
    serde_yaml::to_string(&redact(&value)).context("Failed to render config")
}

/// Write the key into the file as-is; defaults and env values are not persisted.
pub async fn set_api_key(path: &Path, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        bail!("API key cannot be empty");
    }
    let mut config = load_config(path).await?;
    config
        .provider
        .get_or_insert_with(ProviderConfig::default)
        .api_key = Some(key.to_string());
    write_config(&config, path).await
}

pub async fn run(path: &Path, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => print!("{}", show(path).await?),
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::SetApiKey { key } => {
            set_api_key(path, &key).await?;
            note_success(&format!(
                "Saved API key {} to {}",
                mask_secret(key.trim()),
                path.display()
            ));
        }
    }
    Ok(())
}
