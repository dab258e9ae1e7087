//! Parsing of individual server-sent-event lines.

use mindmuse_core::StreamError;
use serde::Deserialize;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single line means to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-empty `choices[0].delta.content`.
    Delta(String),
    /// Explicit end-of-stream sentinel.
    Done,
    /// The provider reported an error inside the stream.
    ProviderError(String),
    /// Nothing to emit: comments, other SSE fields, role-only or empty deltas.
    Skip,
}

#[derive(Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ProviderErrorBody>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ProviderErrorBody,
}

/// Interpret one complete line of the response body.
///
/// Only lines starting with `data: ` carry payloads; anything else is skipped.
/// A payload that is not valid JSON is a recoverable `FrameParse` error.
pub fn parse_line(line: &str) -> Result<Frame, StreamError> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(Frame::Skip);
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(Frame::Done);
    }

    let envelope: ChunkEnvelope =
        serde_json::from_str(payload).map_err(|e| StreamError::FrameParse {
            line: line.to_string(),
            reason: e.to_string(),
        })?;

    if let Some(err) = envelope.error {
        return Ok(Frame::ProviderError(describe(&err)));
    }

    let content = envelope
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content);

    Ok(match content {
        Some(text) if !text.is_empty() => Frame::Delta(text),
        _ => Frame::Skip,
    })
}

/// Human-readable message from a `{"error": {...}}` body, if it has that shape.
pub fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| describe(&e.error))
}

fn describe(err: &ProviderErrorBody) -> String {
    let message = err.message.clone().unwrap_or_else(|| "unknown error".to_string());
    match &err.code {
        Some(code) => format!("{message} (code {code})"),
        None => message,
    }
}
