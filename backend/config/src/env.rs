//! Environment handling for config values.
//!
//! `${VAR_NAME}` in any string value is replaced at load time; only
//! uppercase `[A-Z_][A-Z0-9_]*` names are recognised. `$${VAR}` escapes to a
//! literal `${VAR}`. After substitution, a few well-known variables
//! override individual settings.

use std::collections::HashMap;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::schema::{MindMuseConfig, ProviderConfig, SettingsConfig};

/// Fills `provider.apiKey` when the file leaves it unset.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
/// Overrides `settings.model`.
pub const MODEL_ENV: &str = "MINDMUSE_MODEL";

// Captures an optional leading `$` (escape) and the variable name.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\$?)\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute `${VAR}` references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute `${VAR}` references using `env`. A referenced variable that
/// is unset or empty is an error.
pub fn resolve_env_vars_with(value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    Ok(substitute_value(value, env, "")?)
}

fn substitute_value(
    value: &Value,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<Value, MissingEnvVarError> {
    match value {
        Value::String(s) => Ok(Value::String(substitute_string(s, env, path)?)),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_value(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (k, v) in map {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                result.insert(k.clone(), substitute_value(v, env, &child_path)?);
            }
            Ok(Value::Object(result))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(
    s: &str,
    env: &HashMap<String, String>,
    path: &str,
) -> Result<String, MissingEnvVarError> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(s, |caps: &regex::Captures| {
        let name = &caps[2];
        if !caps[1].is_empty() {
            return format!("${{{name}}}");
        }
        match env.get(name) {
            Some(val) if !val.is_empty() => val.clone(),
            _ => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                });
                String::new()
            }
        }
    });

    match missing {
        Some(err) => Err(err),
        None => Ok(substituted.into_owned()),
    }
}

/// Names of all variables referenced in a value tree, sorted and deduplicated.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    let mut vars = Vec::new();
    collect_vars_recursive(value, &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

fn collect_vars_recursive(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for caps in ENV_VAR_PATTERN.captures_iter(s) {
                if caps[1].is_empty() {
                    out.push(caps[2].to_string());
                }
            }
        }
        Value::Array(arr) => arr.iter().for_each(|v| collect_vars_recursive(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_vars_recursive(v, out)),
        _ => {}
    }
}

/// Apply `OPENROUTER_API_KEY` and `MINDMUSE_MODEL`.
pub fn apply_env_overrides_with(
    mut config: MindMuseConfig,
    env: &HashMap<String, String>,
) -> MindMuseConfig {
    if let Some(key) = env.get(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
        let provider = config.provider.get_or_insert_with(ProviderConfig::default);
        if provider.api_key.as_deref().map(str::trim).unwrap_or("").is_empty() {
            provider.api_key = Some(key.clone());
        }
    }
    if let Some(model) = env.get(MODEL_ENV).filter(|m| !m.trim().is_empty()) {
        let settings = config.settings.get_or_insert_with(SettingsConfig::default);
        settings.model = Some(model.clone());
    }
    config
}
