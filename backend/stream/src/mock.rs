use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use mindmuse_core::{StreamError, Transcript};

use crate::config::RequestConfig;
use crate::consumer::{fragments, FragmentStream, ReplyProvider};
use crate::request::{build_request, ChatRequest};

/// What a [`MockReplyProvider`] does on one call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Serve these raw body chunks as a successful streamed response.
    Chunks(Vec<Bytes>),
    /// Fail with a non-success status.
    Http { status: u16, body: String },
    /// Fail before any byte arrives.
    Transport(String),
}

impl MockOutcome {
    /// A well-formed stream delivering `text` word by word, ending in `[DONE]`.
    pub fn reply(text: &str) -> Self {
        let mut chunks: Vec<Bytes> = text
            .split_inclusive(' ')
            .map(|word| {
                let frame = serde_json::json!({"choices": [{"delta": {"content": word}}]});
                Bytes::from(format!("data: {frame}\n\n"))
            })
            .collect();
        chunks.push(Bytes::from_static(b"data: [DONE]\n\n"));
        MockOutcome::Chunks(chunks)
    }

    pub fn http(status: u16) -> Self {
        MockOutcome::Http {
            status,
            body: format!("mock status {status}"),
        }
    }
}

/// Reply provider returning scripted outcomes, for tests and offline use.
///
/// Outcomes are consumed in order; once the script runs out every call
/// gets the default reply. Requests are still built and validated, so
/// configuration errors surface exactly as with the real consumer.
pub struct MockReplyProvider {
    name: String,
    script: Mutex<VecDeque<MockOutcome>>,
    default_reply: String,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockReplyProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            default_reply: "Mock response".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn with_outcome(self, outcome: MockOutcome) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// Every request body sent so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_outcome(&self) -> MockOutcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| MockOutcome::reply(&self.default_reply))
    }
}

#[async_trait]
impl ReplyProvider for MockReplyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        transcript: &Transcript,
        config: &RequestConfig,
    ) -> Result<FragmentStream, StreamError> {
        config.validate()?;
        let request = build_request(transcript, config)?;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        match self.next_outcome() {
            MockOutcome::Chunks(chunks) => Ok(fragments(stream::iter(
                chunks.into_iter().map(Ok::<_, std::io::Error>),
            ))),
            MockOutcome::Http { status, body } => Err(StreamError::Http { status, body }),
            MockOutcome::Transport(reason) => Err(StreamError::Transport(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::collect_text;
    use mindmuse_core::{ChatMessage, StreamErrorKind};

    fn transcript() -> Transcript {
        vec![ChatMessage::user("hello")].into_iter().collect()
    }

    fn config() -> RequestConfig {
        RequestConfig::default().with_auth_token("k")
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let mock = MockReplyProvider::new("mock")
            .with_reply("fallback default")
            .with_outcome(MockOutcome::reply("I hear you."))
            .with_outcome(MockOutcome::http(503));

        let first = mock.send(&transcript(), &config()).await.unwrap();
        assert_eq!(collect_text(first).await.unwrap(), "I hear you.");

        let second = mock.send(&transcript(), &config()).await;
        assert_eq!(second.err().map(|e| e.status()), Some(Some(503)));

        let third = mock.send(&transcript(), &config()).await.unwrap();
        assert_eq!(collect_text(third).await.unwrap(), "fallback default");
        assert_eq!(mock.requests().len(), 3);
        assert_eq!(mock.name(), "mock");
    }

    #[tokio::test]
    async fn test_config_errors_surface() {
        let mock = MockReplyProvider::new("mock");
        let err = match mock.send(&transcript(), &RequestConfig::default()).await {
            Ok(_) => panic!("expected config error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), StreamErrorKind::Config);
        assert!(mock.requests().is_empty());
    }
}
