//! Request body construction: synthesized system message plus the context window.

use mindmuse_core::{ChatMessage, MessageContent, Role, StreamError, Transcript};
use serde::Serialize;

use crate::config::RequestConfig;

/// One message as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Chat-completion request body with incremental delivery enabled.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Build the request body for `transcript`.
///
/// The transcript must be non-empty and end with a user message. Stored
/// system messages are dropped in favour of `config.system_prompt`, which is
/// always sent first; of the rest only the last `config.context_window` are
/// kept. The transcript itself is not modified.
pub fn build_request(
    transcript: &Transcript,
    config: &RequestConfig,
) -> Result<ChatRequest, StreamError> {
    let last = transcript
        .last()
        .ok_or_else(|| StreamError::Config("transcript is empty".to_string()))?;
    if last.role != Role::User {
        return Err(StreamError::Config(format!(
            "last transcript message must be from the user, got '{}'",
            last.role.as_str()
        )));
    }

    let history: Vec<&ChatMessage> = transcript
        .messages()
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let start = history.len().saturating_sub(config.context_window);

    let mut messages = Vec::with_capacity(history.len() - start + 1);
    messages.push(WireMessage {
        role: Role::System,
        content: MessageContent::Text(config.system_prompt.clone()),
    });
    messages.extend(history[start..].iter().map(|m| WireMessage::from(*m)));

    Ok(ChatRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        stream: true,
    })
}
