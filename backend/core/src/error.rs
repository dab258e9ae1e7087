use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while sending a transcript and consuming the streamed reply.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Missing or invalid request configuration. Fatal to the call, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body was not valid UTF-8.
    #[error("decode error: {0}")]
    Decode(String),

    /// A single framing line could not be parsed. Recovered locally by skipping it.
    #[error("malformed frame ({reason}): {line}")]
    FrameParse { line: String, reason: String },

    /// Connection or body-read failure below the HTTP status level.
    #[error("transport error: {0}")]
    Transport(String),
}

impl StreamError {
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            StreamError::Config(_) => StreamErrorKind::Config,
            StreamError::Http { .. } => StreamErrorKind::Http,
            StreamError::Decode(_) => StreamErrorKind::Decode,
            StreamError::FrameParse { .. } => StreamErrorKind::FrameParse,
            StreamError::Transport(_) => StreamErrorKind::Transport,
        }
    }

    /// Only a bad frame can be skipped without ending the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StreamError::FrameParse { .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StreamError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Data-less classification of a [`StreamError`], carried by `Failed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    Config,
    Http,
    Decode,
    FrameParse,
    Transport,
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamErrorKind::Config => "config_error",
            StreamErrorKind::Http => "http_error",
            StreamErrorKind::Decode => "decode_error",
            StreamErrorKind::FrameParse => "frame_parse_error",
            StreamErrorKind::Transport => "transport_error",
        };
        f.write_str(s)
    }
}
