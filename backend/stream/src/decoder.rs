//! Byte-to-line reassembly for chunked response bodies.
//!
//! Chunk boundaries fall anywhere: inside a multi-byte character or in the
//! middle of a line. Both stages below carry the incomplete tail over to the
//! next chunk instead of failing.

use mindmuse_core::StreamError;

/// Bytes that can never form valid UTF-8, plus the text decoded before them.
#[derive(Debug)]
pub struct InvalidUtf8 {
    pub valid_prefix: String,
    pub error: StreamError,
}

/// Incremental UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` as possible.
    ///
    /// An incomplete character at the end is held back for the next call.
    /// Bytes that can never form valid UTF-8 are a `Decode` error; the text
    /// before them is returned with it.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, InvalidUtf8> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let err = match String::from_utf8(bytes) {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };
        let utf8 = err.utf8_error();
        let valid = utf8.valid_up_to();
        let invalid = utf8.error_len().is_some();
        let mut bytes = err.into_bytes();
        let tail = bytes.split_off(valid);
        // The prefix up to `valid_up_to` is valid by definition.
        let prefix = String::from_utf8_lossy(&bytes).into_owned();

        if invalid {
            return Err(InvalidUtf8 {
                valid_prefix: prefix,
                error: StreamError::Decode(format!(
                    "invalid UTF-8 sequence after {valid} valid bytes"
                )),
            });
        }
        self.pending = tail;
        Ok(prefix)
    }

    /// Called at end of body; leftover bytes mean the body was cut mid-character.
    pub fn finish(&mut self) -> Result<(), StreamError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            let n = self.pending.len();
            self.pending.clear();
            Err(StreamError::Decode(format!(
                "body ended inside a multi-byte character ({n} dangling bytes)"
            )))
        }
    }
}

/// Splits decoded text into complete lines, buffering a partial last line.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed text and get back every line it completes. Blank lines are dropped
    /// and a trailing `\r` is removed.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let mut lines = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let raw: String = self.partial.drain(..=pos).collect();
            if let Some(line) = clean_line(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    /// The unterminated last line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.partial);
        clean_line(&raw)
    }
}

fn clean_line(raw: &str) -> Option<String> {
    let line = raw.strip_suffix('\n').unwrap_or(raw);
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}
