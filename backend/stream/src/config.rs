//! Per-request configuration for the streaming consumer.

use std::fmt;

use mindmuse_core::{StreamError, DEFAULT_CONTEXT_WINDOW};
use reqwest::Url;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_REFERER: &str = "https://mindmuseai.app";
pub const DEFAULT_TITLE: &str = "MindMuseAI";

#[derive(Clone)]
pub struct RequestConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub endpoint: String,
    pub auth_token: Option<String>,
    /// Synthesized as the first message of every request.
    pub system_prompt: String,
    /// How many trailing transcript messages are sent as context.
    pub context_window: usize,
    /// Sent as `HTTP-Referer`.
    pub referer: String,
    /// Sent as `X-Title`.
    pub title: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            model: mindmuse_core::types::DEFAULT_MODEL.to_string(),
            max_tokens: 400,
            temperature: 0.7,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            auth_token: None,
            system_prompt: String::new(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

// Keep the bearer token out of logs.
impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("endpoint", &self.endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("context_window", &self.context_window)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

impl RequestConfig {
    pub fn new(model: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    pub fn with_identification(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    /// The bearer token, or a `Config` error when it is missing or blank.
    pub fn auth_token(&self) -> Result<&str, StreamError> {
        match self.auth_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(StreamError::Config(
                "auth token is missing; set provider.apiKey or OPENROUTER_API_KEY".to_string(),
            )),
        }
    }

    /// Check every option and return the parsed endpoint.
    pub fn validate(&self) -> Result<Url, StreamError> {
        self.auth_token()?;
        if self.model.trim().is_empty() {
            return Err(StreamError::Config("model must not be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(StreamError::Config("maxTokens must be > 0".to_string()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(StreamError::Config(format!(
                "temperature {} is outside [0, 2]",
                self.temperature
            )));
        }
        if self.context_window == 0 {
            return Err(StreamError::Config("context window must be >= 1".to_string()));
        }
        let url = Url::parse(&self.endpoint).map_err(|e| {
            StreamError::Config(format!("invalid endpoint '{}': {e}", self.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StreamError::Config(format!(
                "endpoint must be http(s), got '{}'",
                url.scheme()
            )));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindmuse_core::StreamErrorKind;

    fn valid() -> RequestConfig {
        RequestConfig::default().with_auth_token("sk-or-test")
    }

    #[test]
    fn default_with_token_is_valid() {
        let url = valid().validate().unwrap();
        assert_eq!(url.host_str(), Some("openrouter.ai"));
    }

    #[test]
    fn missing_or_blank_token_is_config_error() {
        let err = RequestConfig::default().validate().unwrap_err();
        assert_eq!(err.kind(), StreamErrorKind::Config);

        let err = RequestConfig::default()
            .with_auth_token("   ")
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), StreamErrorKind::Config);
    }

    #[test]
    fn rejects_out_of_range_options() {
        assert!(valid().with_temperature(2.5).validate().is_err());
        assert!(valid().with_temperature(f32::NAN).validate().is_err());
        assert!(valid().with_max_tokens(0).validate().is_err());
        assert!(valid().with_context_window(0).validate().is_err());
        assert!(RequestConfig::new("", DEFAULT_ENDPOINT)
            .with_auth_token("k")
            .validate()
            .is_err());
        assert!(RequestConfig::new("m", "not a url")
            .with_auth_token("k")
            .validate()
            .is_err());
        assert!(RequestConfig::new("m", "ftp://example.com")
            .with_auth_token("k")
            .validate()
            .is_err());
        assert!(valid().with_temperature(0.0).validate().is_ok());
        assert!(valid().with_temperature(2.0).validate().is_ok());
    }

    #[test]
    fn debug_hides_token() {
        let printed = format!("{:?}", valid());
        assert!(!printed.contains("sk-or-test"));
        assert!(printed.contains("***"));
    }
}
