use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use mindmuse_core::{StreamError, StreamState, TextFragment, Transcript};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::RequestConfig;
use crate::decoder::{LineSplitter, Utf8StreamDecoder};
use crate::frame::{self, parse_line, Frame};
use crate::request::build_request;

/// Lazy, forward-only stream of reply fragments. Dropping it cancels the
/// exchange and releases the response body.
pub type FragmentStream = BoxStream<'static, Result<TextFragment, StreamError>>;

const MAX_ERROR_BODY_CHARS: usize = 300;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can turn a transcript into a streamed reply.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Start one exchange. Errors that happen before the first byte of the
    /// body (configuration, connection, non-success status) are returned
    /// here; later ones are yielded by the stream.
    async fn send(
        &self,
        transcript: &Transcript,
        config: &RequestConfig,
    ) -> Result<FragmentStream, StreamError>;
}

/// Chat-completion client speaking the OpenAI-compatible streaming protocol.
#[derive(Debug, Clone, Default)]
pub struct StreamingReplyConsumer {
    client: Client,
}

impl StreamingReplyConsumer {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// A client that gives up when connecting takes longer than
    /// `CONNECT_TIMEOUT` or the body stalls for `read_timeout`. A reply that
    /// keeps streaming is never cut off.
    pub fn with_read_timeout(read_timeout: Duration) -> Result<Self, StreamError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplyProvider for StreamingReplyConsumer {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn send(
        &self,
        transcript: &Transcript,
        config: &RequestConfig,
    ) -> Result<FragmentStream, StreamError> {
        let url = config.validate()?;
        let token = config.auth_token()?;
        let body = build_request(transcript, config)?;

        debug!(
            model = %body.model,
            messages = body.messages.len(),
            max_tokens = body.max_tokens,
            "sending streaming chat request"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
            .header("HTTP-Referer", &config.referer)
            .header("X-Title", &config.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "chat endpoint returned an error status");
            return Err(StreamError::Http {
                status: status.as_u16(),
                body: api_error_message(&text),
            });
        }

        Ok(fragments(response.bytes_stream()))
    }
}

/// Turn a raw chunked body into reply fragments.
///
/// Malformed lines and in-stream provider errors are logged and skipped.
/// The stream ends at `[DONE]` or end of body; a decode or transport error
/// is yielded once and then the stream ends.
pub fn fragments<S, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let reader = FrameReader::new(body);
    stream::unfold(reader, |mut reader| async move {
        let item = reader.next_fragment().await?;
        Some((item, reader))
    })
    .boxed()
}

/// Drain a fragment stream into the full reply text.
pub async fn collect_text(mut stream: FragmentStream) -> Result<String, StreamError> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?.delta);
    }
    Ok(text)
}

/// Best human-readable description of an error response body.
pub fn api_error_message(body: &str) -> String {
    if let Some(message) = frame::error_message(body) {
        return message;
    }
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{cut}…")
}

struct FrameReader<S> {
    body: Pin<Box<S>>,
    decoder: Utf8StreamDecoder,
    lines: LineSplitter,
    ready: VecDeque<TextFragment>,
    failure: Option<StreamError>,
    state: StreamState,
}

impl<S, E> FrameReader<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    fn new(body: S) -> Self {
        Self {
            body: Box::pin(body),
            decoder: Utf8StreamDecoder::new(),
            lines: LineSplitter::new(),
            ready: VecDeque::new(),
            failure: None,
            state: StreamState::new(),
        }
    }

    async fn next_fragment(&mut self) -> Option<Result<TextFragment, StreamError>> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Some(Ok(fragment));
            }
            if let Some(err) = self.failure.take() {
                return Some(Err(err));
            }
            if !self.state.is_active() {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let (text, invalid) = match self.decoder.decode(&chunk) {
                        Ok(text) => (text, None),
                        Err(invalid) => (invalid.valid_prefix, Some(invalid.error)),
                    };
                    for line in self.lines.push(&text) {
                        self.handle_line(&line);
                        if !self.state.is_active() {
                            break;
                        }
                    }
                    // Lines completed before the bad bytes are emitted first.
                    if let Some(err) = invalid {
                        if self.state.is_active() {
                            self.failure = Some(self.fail(err));
                        }
                    }
                }
                Some(Err(err)) => {
                    return Some(Err(self.fail(StreamError::Transport(err.to_string()))));
                }
                None => {
                    if let Err(err) = self.decoder.finish() {
                        return Some(Err(self.fail(err)));
                    }
                    if let Some(line) = self.lines.finish() {
                        self.handle_line(&line);
                    }
                    if self.state.is_active() {
                        debug!(
                            fragments = self.state.fragments,
                            "stream ended without [DONE]"
                        );
                        self.state.finish();
                    }
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        match parse_line(line) {
            Ok(Frame::Delta(delta)) => {
                let fragment = self.state.apply(&delta);
                self.ready.push_back(fragment);
            }
            Ok(Frame::Done) => {
                debug!(
                    fragments = self.state.fragments,
                    chars = self.state.accumulated_text.chars().count(),
                    "stream complete"
                );
                self.state.finish();
            }
            Ok(Frame::ProviderError(message)) => {
                warn!(error = %message, "provider reported an error mid-stream; skipping");
            }
            Ok(Frame::Skip) => {}
            Err(err) => {
                warn!(error = %err, "skipping malformed stream line");
            }
        }
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        warn!(error = %err, fragments = self.state.fragments, "stream aborted");
        self.state.fail(err.kind());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use mindmuse_core::{ChatMessage, StreamErrorKind};
    use serde_json::{json, Value};

    const HI: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n";
    const THERE_DONE: &str =
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\ndata: [DONE]\n";

    fn body_of(chunks: Vec<Vec<u8>>) -> FragmentStream {
        fragments(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, io::Error>(Bytes::from(c))),
        ))
    }

    fn text_chunks(chunks: &[&str]) -> FragmentStream {
        body_of(chunks.iter().map(|c| c.as_bytes().to_vec()).collect())
    }

    async fn collect_all(mut stream: FragmentStream) -> Vec<Result<TextFragment, StreamError>> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        out
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n",
            json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[tokio::test]
    async fn test_two_chunk_scenario() {
        let items = collect_all(text_chunks(&[HI, THERE_DONE])).await;
        let fragments: Vec<TextFragment> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].delta, "Hi");
        assert_eq!(fragments[0].index, 0);
        assert_eq!(fragments[1].delta, " there");
        assert_eq!(fragments[1].index, 1);

        let text = collect_text(text_chunks(&[HI, THERE_DONE])).await.unwrap();
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let body = [HI, "data: {\"choices\": [{\"delta\"\n", THERE_DONE].concat();
        let text = collect_text(text_chunks(&[&body])).await.unwrap();
        assert_eq!(text, "Hi there");
    }

    #[tokio::test]
    async fn test_any_chunking_yields_same_text() {
        let body = [
            delta("Breathe "),
            delta("in… "),
            delta("😊 olá"),
            ": keep-alive\n".to_string(),
            "data: [DONE]\n".to_string(),
        ]
        .concat();
        let bytes = body.as_bytes();
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            let text = collect_text(body_of(vec![a.to_vec(), b.to_vec()]))
                .await
                .unwrap_or_else(|e| panic!("split at {split}: {e}"));
            assert_eq!(text, "Breathe in… 😊 olá", "split at {split}");
        }

        let singles: Vec<Vec<u8>> = bytes.iter().map(|b| vec![*b]).collect();
        let text = collect_text(body_of(singles)).await.unwrap();
        assert_eq!(text, "Breathe in… 😊 olá");
    }

    #[tokio::test]
    async fn test_eof_without_done_keeps_accumulated_text() {
        // Last line has no trailing newline either.
        let body = format!("{}data: {}", delta("Take a "), json!({"choices":[{"delta":{"content":"breath"}}]}));
        let text = collect_text(text_chunks(&[&body])).await.unwrap();
        assert_eq!(text, "Take a breath");
    }

    #[tokio::test]
    async fn test_done_ends_stream_before_eof() {
        let body = [HI, "data: [DONE]\n", &delta(" ignored")].concat();
        let text = collect_text(text_chunks(&[&body])).await.unwrap();
        assert_eq!(text, "Hi");
    }

    #[tokio::test]
    async fn test_crlf_comments_and_provider_errors() {
        let body = concat!(
            ": OPENROUTER PROCESSING\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n",
            "data: {\"error\":{\"message\":\"upstream hiccup\"}}\r\n",
            "data: [DONE]\r\n"
        );
        let text = collect_text(text_chunks(&[body])).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decode_error_after_earlier_lines() {
        let mut body = HI.as_bytes().to_vec();
        body.extend_from_slice(b"data: \xFF\n");
        let split = HI.len();

        let whole = collect_all(body_of(vec![body.clone()])).await;
        let halves = collect_all(body_of(vec![body[..split].to_vec(), body[split..].to_vec()])).await;
        for items in [whole, halves] {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].as_ref().unwrap().delta, "Hi");
            assert_eq!(items[1].as_ref().unwrap_err().kind(), StreamErrorKind::Decode);
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_after_done_is_ignored() {
        let mut body = [HI, "data: [DONE]\n"].concat().into_bytes();
        body.extend_from_slice(b"\xFF\n");
        let items = collect_all(body_of(vec![body])).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().delta, "Hi");
    }

    #[tokio::test]
    async fn test_body_cut_mid_character_is_decode_error() {
        let full = delta("é");
        let bytes = full.as_bytes();
        let cut = bytes.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let items = collect_all(body_of(vec![bytes[..cut].to_vec()])).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap_err().kind(), StreamErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(HI.as_bytes())),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
            Ok(Bytes::from_static(THERE_DONE.as_bytes())),
        ];
        let items = collect_all(fragments(stream::iter(chunks))).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().delta, "Hi");
        let err = items[1].as_ref().unwrap_err();
        assert_eq!(err.kind(), StreamErrorKind::Transport);
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"Invalid API key","code":401}}"#),
            "Invalid API key (code 401)"
        );
        assert_eq!(api_error_message("  Bad Gateway \n"), "Bad Gateway");
        let long = "é".repeat(MAX_ERROR_BODY_CHARS + 10);
        let message = api_error_message(&long);
        assert!(message.ends_with('…'));
        assert_eq!(message.chars().count(), MAX_ERROR_BODY_CHARS + 1);
    }

    // --- against a local HTTP server ---

    type Seen = Arc<Mutex<Option<(HeaderMap, Value)>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/v1/chat/completions")
    }

    async fn sse_reply(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        *seen.lock().unwrap() = Some((headers, body));
        (
            [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
            [HI, THERE_DONE].concat(),
        )
    }

    /// `HI`, then `THERE_DONE` after `gap`.
    fn slow_body(gap: Duration) -> axum::body::Body {
        let chunks = stream::iter([(Duration::ZERO, HI), (gap, THERE_DONE)]).then(
            |(wait, chunk)| async move {
                tokio::time::sleep(wait).await;
                Ok::<_, io::Error>(Bytes::from_static(chunk.as_bytes()))
            },
        );
        axum::body::Body::from_stream(chunks)
    }

    async fn unauthorized() -> impl IntoResponse {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "No auth credentials found", "code": 401}})),
        )
    }

    fn transcript() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.push(ChatMessage::user("I feel a bit anxious today"));
        transcript
    }

    #[tokio::test]
    async fn test_streams_from_server_with_expected_request() {
        let seen: Seen = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route("/api/v1/chat/completions", post(sse_reply))
            .with_state(seen.clone());
        let endpoint = serve(router).await;

        let config = RequestConfig::new("test/model", endpoint)
            .with_auth_token("sk-or-test")
            .with_system_prompt("You are a calm companion.")
            .with_max_tokens(250)
            .with_temperature(0.5);

        let consumer = StreamingReplyConsumer::new();
        let stream = consumer.send(&transcript(), &config).await.unwrap();
        assert_eq!(collect_text(stream).await.unwrap(), "Hi there");

        let (headers, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(headers["authorization"], "Bearer sk-or-test");
        assert_eq!(headers["http-referer"], "https://mindmuseai.app");
        assert_eq!(headers["x-title"], "MindMuseAI");
        assert_eq!(body["model"], "test/model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 250);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a calm companion.");
        assert_eq!(body["messages"][1]["content"], "I feel a bit anxious today");
    }

    #[tokio::test]
    async fn test_http_401_yields_http_error() {
        let router = Router::new().route("/api/v1/chat/completions", post(unauthorized));
        let endpoint = serve(router).await;
        let config = RequestConfig::new("test/model", endpoint).with_auth_token("wrong");

        let err = match StreamingReplyConsumer::new().send(&transcript(), &config).await {
            Ok(_) => panic!("expected an HTTP error"),
            Err(err) => err,
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.kind(), StreamErrorKind::Http);
        assert!(err.to_string().contains("No auth credentials found"));
    }

    #[tokio::test]
    async fn test_missing_token_is_config_error() {
        let err = match StreamingReplyConsumer::new()
            .send(&transcript(), &RequestConfig::default())
            .await
        {
            Ok(_) => panic!("expected a config error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), StreamErrorKind::Config);
    }

    #[tokio::test]
    async fn test_read_timeout_allows_long_replies_but_not_stalls() {
        let steady = Router::new().route(
            "/api/v1/chat/completions",
            post(|| async {
                let chunks = stream::iter(0..6).then(|i| async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let line = if i < 5 { delta("·") } else { "data: [DONE]\n".to_string() };
                    Ok::<_, io::Error>(Bytes::from(line))
                });
                axum::body::Body::from_stream(chunks)
            }),
        );
        let stalled = Router::new().route(
            "/api/v1/chat/completions",
            post(|| async { slow_body(Duration::from_secs(5)) }),
        );
        let consumer = StreamingReplyConsumer::with_read_timeout(Duration::from_millis(400)).unwrap();

        // Six reads 100ms apart outlast the read timeout as a whole.
        let config = RequestConfig::new("m", serve(steady).await).with_auth_token("k");
        let stream = consumer.send(&transcript(), &config).await.unwrap();
        assert_eq!(collect_text(stream).await.unwrap(), "·····");

        let config = RequestConfig::new("m", serve(stalled).await).with_auth_token("k");
        let items = collect_all(consumer.send(&transcript(), &config).await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().delta, "Hi");
        assert_eq!(items[1].as_ref().unwrap_err().kind(), StreamErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = RequestConfig::new("m", format!("http://{addr}/v1/chat/completions"))
            .with_auth_token("k");
        let err = match StreamingReplyConsumer::new().send(&transcript(), &config).await {
            Ok(_) => panic!("expected a transport error"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), StreamErrorKind::Transport);
    }
}
