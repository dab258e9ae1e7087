//! `mindmuse-stream` — sends a transcript to a chat-completion endpoint and
//! turns the server-sent-event body into a stream of text fragments.
//!
//! The pipeline per response: raw chunks → [`Utf8StreamDecoder`] →
//! [`LineSplitter`] → [`parse_line`] → [`TextFragment`](mindmuse_core::TextFragment).

pub mod config;
pub mod consumer;
pub mod decoder;
pub mod frame;
pub mod mock;
pub mod request;

pub use config::RequestConfig;
pub use consumer::{collect_text, fragments, FragmentStream, ReplyProvider, StreamingReplyConsumer};
pub use decoder::{InvalidUtf8, LineSplitter, Utf8StreamDecoder};
pub use frame::{parse_line, Frame};
pub use mock::{MockOutcome, MockReplyProvider};
pub use request::{build_request, ChatRequest, WireMessage};
