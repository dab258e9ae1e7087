//! One conversation and the turns run against it.

use std::sync::Arc;

use anyhow::{Result, bail};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use mindmuse_core::{
    ChatMessage, ConversationStore, MessageContent, Role, Settings, StreamError, StreamErrorKind,
    StreamEvent, Transcript, TurnObserver, UserKey,
};
use mindmuse_stream::{ReplyProvider, RequestConfig};

use crate::fallback::FallbackPolicy;
use crate::system_prompt::PromptBuilder;

/// Opening line shown when a new conversation starts.
pub const GREETING: &str =
    "Hello! I'm MindMuseAI Bot, your mental health companion. How are you feeling today?";

/// How a turn resolved. Either way the transcript ends with an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered.
    Answered { text: String },
    /// The exchange failed and a canned reply was used instead.
    Fallback { kind: StreamErrorKind, text: String },
}

impl TurnOutcome {
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Answered { text } | TurnOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, TurnOutcome::Fallback { .. })
    }
}

/// Collaborators shared by every turn: reply provider, store, observers.
pub struct TurnContext {
    provider: Arc<dyn ReplyProvider>,
    store: Arc<dyn ConversationStore>,
    base_config: RequestConfig,
    observers: Vec<Arc<dyn TurnObserver>>,
    fallback: FallbackPolicy,
}

impl TurnContext {
    pub fn new(
        provider: Arc<dyn ReplyProvider>,
        store: Arc<dyn ConversationStore>,
        base_config: RequestConfig,
    ) -> Self {
        Self {
            provider,
            store,
            base_config,
            observers: Vec::new(),
            fallback: FallbackPolicy::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn base_config(&self) -> &RequestConfig {
        &self.base_config
    }

    async fn notify(&self, conversation_id: &str, event: &StreamEvent) {
        for observer in &self.observers {
            observer.on_event(conversation_id, event).await;
        }
    }
}

/// An open conversation. `submit` borrows the session mutably, so only one
/// turn can be in flight at a time.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: String,
    user: UserKey,
    transcript: Transcript,
    settings: Settings,
}

pub fn new_conversation_id() -> String {
    format!("chat_{}", uuid::Uuid::new_v4().simple())
}

impl ConversationSession {
    pub fn new(user: UserKey, settings: Settings) -> Self {
        Self::with_id(new_conversation_id(), user, settings)
    }

    pub fn with_id(id: impl Into<String>, user: UserKey, settings: Settings) -> Self {
        Self {
            id: id.into(),
            user,
            transcript: Transcript::new(),
            settings,
        }
    }

    /// Reopen a stored conversation.
    pub async fn resume(
        id: &str,
        user: UserKey,
        settings: Settings,
        store: &dyn ConversationStore,
    ) -> Result<Self> {
        let Some(transcript) = store.get(&user, id).await? else {
            bail!("conversation '{id}' not found");
        };
        debug!(conversation_id = id, messages = transcript.len(), "resumed conversation");
        Ok(Self {
            id: id.to_string(),
            user,
            transcript,
            settings,
        })
    }

    /// Resume `id` if it exists, otherwise start an empty conversation under that id.
    pub async fn open(
        id: &str,
        user: UserKey,
        settings: Settings,
        store: &dyn ConversationStore,
    ) -> Result<Self> {
        match store.get(&user, id).await? {
            Some(transcript) => Ok(Self {
                id: id.to_string(),
                user,
                transcript,
                settings,
            }),
            None => Ok(Self::with_id(id, user, settings)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user(&self) -> &UserKey {
        &self.user
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Request options for this session: model and style from the settings,
    /// everything else from `base`.
    pub fn request_config(&self, base: &RequestConfig) -> RequestConfig {
        let style = self.settings.response_style;
        let mut config = base
            .clone()
            .with_max_tokens(style.max_tokens())
            .with_temperature(style.temperature())
            .with_system_prompt(PromptBuilder::build(style));
        config.model = self.settings.model.clone();
        config
    }

    /// Run one turn for a user message. Never fails: errors from the reply
    /// provider turn into a fallback reply, storage errors are logged.
    #[instrument(skip_all, fields(conversation_id = %self.id))]
    pub async fn submit(
        &mut self,
        ctx: &TurnContext,
        content: impl Into<MessageContent>,
    ) -> TurnOutcome {
        let message = ChatMessage::new(Role::User, content);
        self.transcript.push(message.clone());
        self.persist(ctx, &message).await;

        let config = self.request_config(&ctx.base_config);
        let outcome = match self.stream_reply(ctx, &config).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(provider = ctx.provider.name(), chars = text.chars().count(), "reply complete");
                ctx.notify(&self.id, &StreamEvent::Complete { text: text.clone() })
                    .await;
                TurnOutcome::Answered { text }
            }
            Ok(_) => {
                warn!("model returned an empty reply; using fallback text");
                let text = self.fallback_text(ctx);
                ctx.notify(&self.id, &StreamEvent::Complete { text: text.clone() })
                    .await;
                TurnOutcome::Answered { text }
            }
            Err(err) => {
                let kind = err.kind();
                warn!(error = %err, %kind, "reply failed; using fallback text");
                let text = self.fallback_text(ctx);
                ctx.notify(
                    &self.id,
                    &StreamEvent::Failed {
                        kind,
                        fallback: text.clone(),
                    },
                )
                .await;
                TurnOutcome::Fallback { kind, text }
            }
        };

        let reply = ChatMessage::assistant(outcome.text());
        self.transcript.push(reply.clone());
        self.persist(ctx, &reply).await;
        outcome
    }

    async fn stream_reply(
        &self,
        ctx: &TurnContext,
        config: &RequestConfig,
    ) -> Result<String, StreamError> {
        let mut stream = ctx.provider.send(&self.transcript, config).await?;
        let mut accumulated = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            accumulated.push_str(&fragment.delta);
            ctx.notify(
                &self.id,
                &StreamEvent::Update {
                    delta: fragment.delta,
                    accumulated: accumulated.clone(),
                },
            )
            .await;
        }
        Ok(accumulated)
    }

    fn fallback_text(&self, ctx: &TurnContext) -> String {
        let last = self.transcript.last_user_text();
        ctx.fallback.respond(last.as_deref()).to_string()
    }

    async fn persist(&self, ctx: &TurnContext, message: &ChatMessage) {
        if let Err(e) = ctx.store.append(&self.user, &self.id, message).await {
            warn!(error = %e, role = message.role.as_str(), "failed to persist message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mindmuse_core::ResponseStyle;
    use mindmuse_memory::InMemoryStore;
    use mindmuse_stream::{MockOutcome, MockReplyProvider};

    use crate::fallback::{ANXIETY_REPLY, DEFAULT_REPLY};

    /// A body whose valid first line is followed by bytes that are not UTF-8.
    fn broken_body(line: &str) -> MockOutcome {
        let mut body = line.as_bytes().to_vec();
        body.extend_from_slice(b"data: \xFF\n");
        MockOutcome::Chunks(vec![body.into()])
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StreamEvent>>);

    #[async_trait]
    impl TurnObserver for Recorder {
        async fn on_event(&self, _conversation_id: &str, event: &StreamEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        async fn get(&self, _: &UserKey, _: &str) -> Result<Option<Transcript>> {
            bail!("disk on fire")
        }
        async fn set(&self, _: &UserKey, _: &str, _: &Transcript) -> Result<()> {
            bail!("disk on fire")
        }
        async fn append(&self, _: &UserKey, _: &str, _: &ChatMessage) -> Result<()> {
            bail!("disk on fire")
        }
        async fn delete(&self, _: &UserKey, _: &str) -> Result<()> {
            bail!("disk on fire")
        }
        async fn list_all(&self, _: &UserKey) -> Result<Vec<mindmuse_core::ConversationSummary>> {
            bail!("disk on fire")
        }
    }

    fn base() -> RequestConfig {
        RequestConfig::default().with_auth_token("sk-or-test")
    }

    fn setup(mock: MockReplyProvider) -> (Arc<MockReplyProvider>, Arc<InMemoryStore>, Arc<Recorder>, TurnContext) {
        let provider = Arc::new(mock);
        let store = Arc::new(InMemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let ctx = TurnContext::new(provider.clone(), store.clone(), base())
            .with_observer(recorder.clone());
        (provider, store, recorder, ctx)
    }

    #[tokio::test]
    async fn test_answered_turn_emits_updates_then_complete() {
        let (_, store, recorder, ctx) =
            setup(MockReplyProvider::new("mock").with_outcome(MockOutcome::reply("Let's breathe together.")));
        let mut session = ConversationSession::new(UserKey::Anonymous, Settings::default());

        let outcome = session.submit(&ctx, "I feel anxious").await;
        assert_eq!(
            outcome,
            TurnOutcome::Answered {
                text: "Let's breathe together.".into()
            }
        );

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            StreamEvent::Update {
                delta: "Let's ".into(),
                accumulated: "Let's ".into()
            }
        );
        assert!(matches!(&events[2], StreamEvent::Update { accumulated, .. } if accumulated == "Let's breathe together."));
        assert_eq!(
            events[3],
            StreamEvent::Complete {
                text: "Let's breathe together.".into()
            }
        );

        let stored = store
            .get(&UserKey::Anonymous, session.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.messages()[0].role, Role::User);
        assert_eq!(stored.messages()[1].text(), "Let's breathe together.");
        assert_eq!(session.transcript(), &stored);
    }

    #[tokio::test]
    async fn test_http_error_falls_back_by_keyword() {
        let (_, store, recorder, ctx) =
            setup(MockReplyProvider::new("mock").with_outcome(MockOutcome::http(401)));
        let mut session = ConversationSession::new(UserKey::Anonymous, Settings::default());

        let outcome = session.submit(&ctx, "My anxiety is through the roof").await;
        assert_eq!(
            outcome,
            TurnOutcome::Fallback {
                kind: StreamErrorKind::Http,
                text: ANXIETY_REPLY.into()
            }
        );
        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![StreamEvent::Failed {
                kind: StreamErrorKind::Http,
                fallback: ANXIETY_REPLY.into()
            }]
        );
        let stored = store.get(&UserKey::Anonymous, session.id()).await.unwrap().unwrap();
        assert_eq!(stored.last().unwrap().text(), ANXIETY_REPLY);
    }

    #[tokio::test]
    async fn test_missing_token_is_config_fallback() {
        let provider = Arc::new(MockReplyProvider::new("mock"));
        let store = Arc::new(InMemoryStore::new());
        let ctx = TurnContext::new(provider.clone(), store, RequestConfig::default());
        let mut session = ConversationSession::new(UserKey::Anonymous, Settings::default());

        let outcome = session.submit(&ctx, "anything").await;
        assert_eq!(
            outcome,
            TurnOutcome::Fallback {
                kind: StreamErrorKind::Config,
                text: DEFAULT_REPLY.into()
            }
        );
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_decode_error_discards_partial_text() {
        let outcome = broken_body("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n");
        let (_, _, recorder, ctx) = setup(MockReplyProvider::new("mock").with_outcome(outcome));
        let mut session = ConversationSession::new(UserKey::Anonymous, Settings::default());

        let result = session.submit(&ctx, "hi").await;
        assert!(result.is_fallback());
        assert_eq!(session.transcript().last().unwrap().text(), result.text());
        let events = recorder.0.lock().unwrap().clone();
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Failed {
                kind: StreamErrorKind::Decode,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_empty_reply_uses_fallback_text() {
        let (_, _, recorder, ctx) = setup(
            MockReplyProvider::new("mock")
                .with_outcome(MockOutcome::Chunks(vec!["data: [DONE]\n".into()])),
        );
        let mut session = ConversationSession::new(UserKey::Anonymous, Settings::default());

        let outcome = session.submit(&ctx, "ok").await;
        assert_eq!(outcome, TurnOutcome::Answered { text: DEFAULT_REPLY.into() });
        assert_eq!(
            recorder.0.lock().unwrap().clone(),
            vec![StreamEvent::Complete {
                text: DEFAULT_REPLY.into()
            }]
        );
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_abort_turn() {
        let ctx = TurnContext::new(
            Arc::new(MockReplyProvider::new("mock").with_reply("Still here.")),
            Arc::new(BrokenStore),
            base(),
        );
        let mut session = ConversationSession::new(UserKey::Anonymous, Settings::default());
        let outcome = session.submit(&ctx, "hello").await;
        assert_eq!(outcome.text(), "Still here.");
        assert_eq!(session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn test_request_uses_style_and_window() {
        let (provider, _, _, ctx) = setup(MockReplyProvider::new("mock"));
        let settings = Settings {
            response_style: ResponseStyle::Concise,
            model: "test/model".into(),
            ..Settings::default()
        };
        let mut session = ConversationSession::new(UserKey::Anonymous, settings);
        for i in 0..7 {
            session.submit(&ctx, format!("message {i}")).await;
        }

        let requests = provider.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.model, "test/model");
        assert_eq!(last.max_tokens, 250);
        assert_eq!(last.temperature, 0.5);
        // system + the 10 most recent of 13 messages
        assert_eq!(last.messages.len(), 11);
        assert_eq!(last.messages[0].role, Role::System);
        assert!(last.messages[0].content.as_text().ends_with("brief and to the point."));
        assert_eq!(last.messages[10].content.as_text(), "message 6");
        assert_eq!(session.transcript().len(), 14);
    }

    #[tokio::test]
    async fn test_resume_and_open() {
        let (_, store, _, ctx) = setup(MockReplyProvider::new("mock"));
        let mut session = ConversationSession::new(UserKey::Anonymous, Settings::default());
        session.submit(&ctx, "first").await;

        let resumed = ConversationSession::resume(
            session.id(),
            UserKey::Anonymous,
            Settings::default(),
            store.as_ref(),
        )
        .await
        .unwrap();
        assert_eq!(resumed.transcript().len(), 2);

        assert!(ConversationSession::resume("chat_missing", UserKey::Anonymous, Settings::default(), store.as_ref())
            .await
            .is_err());
        let fresh = ConversationSession::open("chat_missing", UserKey::Anonymous, Settings::default(), store.as_ref())
            .await
            .unwrap();
        assert_eq!(fresh.id(), "chat_missing");
        assert!(fresh.transcript().is_empty());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = TurnOutcome::Fallback {
            kind: StreamErrorKind::Transport,
            text: "x".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "fallback");
        assert_eq!(json["kind"], "transport");
        assert!(new_conversation_id().starts_with("chat_"));
    }
}
