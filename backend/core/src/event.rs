use serde::{Deserialize, Serialize};

use crate::error::StreamErrorKind;

/// One incremental piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Position of this fragment in the reply, starting at 0.
    pub index: usize,
    pub delta: String,
}

/// Notifications emitted over the lifetime of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment arrived; `accumulated` is the reply so far.
    Update { delta: String, accumulated: String },
    /// The stream finished; `text` is the full reply.
    Complete { text: String },
    /// The exchange failed; `fallback` is the text substituted for the reply.
    Failed {
        kind: StreamErrorKind,
        fallback: String,
    },
}

/// Transient per-request state. Created when a request starts, dropped when it resolves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    pub accumulated_text: String,
    pub fragments: usize,
    pub done: bool,
    pub failed: bool,
    pub error_kind: Option<StreamErrorKind>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return the fragment describing it.
    pub fn apply(&mut self, delta: &str) -> TextFragment {
        self.accumulated_text.push_str(delta);
        let fragment = TextFragment {
            index: self.fragments,
            delta: delta.to_string(),
        };
        self.fragments += 1;
        fragment
    }

    pub fn finish(&mut self) {
        self.done = true;
    }

    pub fn fail(&mut self, kind: StreamErrorKind) {
        self.done = true;
        self.failed = true;
        self.error_kind = Some(kind);
    }

    pub fn is_active(&self) -> bool {
        !self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_accumulates_in_order() {
        let mut state = StreamState::new();
        let a = state.apply("Hi");
        let b = state.apply(" there");
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_eq!(state.accumulated_text, "Hi there");
        assert!(state.is_active());
        state.finish();
        assert!(!state.is_active());
        assert!(!state.failed);
    }

    #[test]
    fn test_fail_records_kind() {
        let mut state = StreamState::new();
        state.fail(StreamErrorKind::Http);
        assert!(state.failed);
        assert_eq!(state.error_kind, Some(StreamErrorKind::Http));
    }

    #[test]
    fn test_event_serialization() {
        let event = StreamEvent::Failed {
            kind: StreamErrorKind::Transport,
            fallback: "I'm here to support you.".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["kind"], "transport");
    }
}
