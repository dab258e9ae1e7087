//! `chat` and `send`: run turns against the reply provider, printing
//! fragments as they arrive.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use mindmuse_core::{MessageContent, ResponseStyle, Role, Settings, StreamEvent, TurnObserver};
use mindmuse_logging::ConversationEvent;
use mindmuse_session::{ConversationSession, LoggingObserver, SpeechObserver, TurnContext, GREETING};
use mindmuse_stream::ReplyProvider;

use crate::app::App;
use crate::attachment::attachment_content;
use crate::mood_cmd::record_mood;
use crate::speech::CommandSpeech;
use crate::terminal_output::{
    note_info, note_success, note_warn, render_message, speaker_label, stream_write,
};

/// How many earlier messages are shown when a conversation is resumed.
const RESUME_PREVIEW: usize = 4;

const HELP: &str = "Commands: /attach <path> [message], /mood <mood> [note], \
/style <concise|balanced|detailed>, /help, /quit";

#[derive(Debug, Default)]
pub struct ChatOptions {
    pub conversation: Option<String>,
    pub style: Option<ResponseStyle>,
    pub model: Option<String>,
}

impl ChatOptions {
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(style) = self.style {
            settings.response_style = style;
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        settings
    }
}

// ---------------------------------------------------------------------------
// Streamed printing
// ---------------------------------------------------------------------------

/// Writes each reply as it streams in. A reply that arrives without
/// fragments (fallbacks, empty streams) is written whole.
pub struct PrintObserver<W> {
    out: Mutex<W>,
    printed: AtomicBool,
}

impl PrintObserver<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> PrintObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            printed: AtomicBool::new(false),
        }
    }

    fn write(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else { return };
        if let Err(e) = stream_write(&mut *out, text) {
            debug!(error = %e, "stdout write failed");
        }
    }

    fn label(&self) -> String {
        format!("{}: ", speaker_label(Role::Assistant))
    }
}

#[async_trait]
impl<W: Write + Send> TurnObserver for PrintObserver<W> {
    async fn on_event(&self, _conversation_id: &str, event: &StreamEvent) {
        match event {
            StreamEvent::Update { delta, .. } => {
                if !self.printed.swap(true, Ordering::SeqCst) {
                    self.write(&self.label());
                }
                self.write(delta);
            }
            StreamEvent::Complete { text } => {
                if self.printed.swap(false, Ordering::SeqCst) {
                    self.write("\n");
                } else {
                    self.write(&format!("{}{text}\n", self.label()));
                }
            }
            StreamEvent::Failed { fallback, .. } => {
                if self.printed.swap(false, Ordering::SeqCst) {
                    // Partial text was shown; the fallback replaces it.
                    self.write(" …\n");
                }
                self.write(&format!("{}{fallback}\n", self.label()));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// REPL input
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum ReplInput {
    Empty,
    Quit,
    Help,
    Mood { mood: String, note: Option<String> },
    Style(ResponseStyle),
    Attach { path: PathBuf, text: Option<String> },
    Message(String),
}

pub fn parse_input(line: &str) -> Result<ReplInput, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplInput::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(ReplInput::Message(line.to_string()));
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name.to_lowercase().as_str() {
        "quit" | "exit" => Ok(ReplInput::Quit),
        "help" => Ok(ReplInput::Help),
        "mood" => {
            let (mood, note) = match rest.split_once(char::is_whitespace) {
                Some((mood, note)) => (mood, Some(note.trim().to_string())),
                None => (rest, None),
            };
            if mood.is_empty() {
                return Err("usage: /mood <mood> [note]".to_string());
            }
            Ok(ReplInput::Mood {
                mood: mood.to_string(),
                note: note.filter(|n| !n.is_empty()),
            })
        }
        "style" => rest.parse().map(ReplInput::Style),
        "attach" => {
            let (path, text) = match rest.split_once(char::is_whitespace) {
                Some((path, text)) => (path, Some(text.trim().to_string())),
                None => (rest, None),
            };
            if path.is_empty() {
                return Err("usage: /attach <path> [message]".to_string());
            }
            Ok(ReplInput::Attach {
                path: PathBuf::from(path),
                text: text.filter(|t| !t.is_empty()),
            })
        }
        other => Err(format!("unknown command '/{other}'. {HELP}")),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Collaborators for every turn: storage, the printer, event logging and,
/// when enabled, speech.
pub fn turn_context(
    app: &App,
    provider: Arc<dyn ReplyProvider>,
    printer: Arc<dyn TurnObserver>,
    settings: &Settings,
) -> TurnContext {
    let mut ctx = TurnContext::new(provider, app.stores.conversations.clone(), app.base_request())
        .with_observer(printer)
        .with_observer(Arc::new(app.events))
        .with_observer(Arc::new(LoggingObserver));

    if settings.voice_enabled {
        match app.config.voice_command().as_deref().and_then(CommandSpeech::parse) {
            Some(speech) => {
                ctx = ctx.with_observer(Arc::new(SpeechObserver::new(Arc::new(speech), true)));
            }
            None => debug!("voice enabled without a voice command"),
        }
    }
    ctx
}

async fn open_session(app: &App, options: &ChatOptions) -> Result<ConversationSession> {
    let settings = options.apply(app.settings());
    match &options.conversation {
        Some(id) => {
            ConversationSession::open(id, app.user.clone(), settings, &*app.stores.conversations)
                .await
        }
        None => Ok(ConversationSession::new(app.user.clone(), settings)),
    }
}

/// Message text, with the file at `attach` added when given.
pub async fn message_content(text: Option<String>, attach: Option<&Path>) -> Result<MessageContent> {
    match attach {
        Some(path) => attachment_content(path, text.as_deref()).await,
        None => match text.filter(|t| !t.trim().is_empty()) {
            Some(text) => Ok(MessageContent::Text(text)),
            None => bail!("nothing to send: give a message or an attachment"),
        },
    }
}

async fn run_turn(
    app: &App,
    session: &mut ConversationSession,
    ctx: &TurnContext,
    content: MessageContent,
) {
    app.events.log_event(
        session.id(),
        ConversationEvent::UserMessage {
            content: content.as_text(),
        },
    );
    let outcome = session.submit(ctx, content).await;
    debug!(fallback = outcome.is_fallback(), "turn finished");
}

/// One-shot turn. Prints the conversation id so it can be continued.
pub async fn run_send(
    app: &App,
    provider: Arc<dyn ReplyProvider>,
    printer: Arc<dyn TurnObserver>,
    message: Option<String>,
    attach: Option<&Path>,
    options: ChatOptions,
) -> Result<String> {
    let content = message_content(message, attach).await?;
    let mut session = open_session(app, &options).await?;
    let ctx = turn_context(app, provider, printer, session.settings());
    run_turn(app, &mut session, &ctx, content).await;
    Ok(session.id().to_string())
}

/// Interactive chat until `/quit` or end of input.
pub async fn run_chat<R>(
    app: &App,
    provider: Arc<dyn ReplyProvider>,
    printer: Arc<dyn TurnObserver>,
    options: ChatOptions,
    input: R,
) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut session = open_session(app, &options).await?;
    let mut ctx = turn_context(app, provider.clone(), printer.clone(), session.settings());

    if session.transcript().is_empty() {
        println!("{}: {GREETING}", speaker_label(Role::Assistant));
    } else {
        note_info(&format!("Resuming '{}'", session.transcript().title()));
        for message in session.transcript().tail(RESUME_PREVIEW) {
            println!("{}", render_message(message));
        }
    }
    note_info(HELP);

    let mut lines = input.lines();
    loop {
        print!("{}: ", speaker_label(Role::User));
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        match parse_input(&line) {
            Ok(ReplInput::Empty) => {}
            Ok(ReplInput::Quit) => break,
            Ok(ReplInput::Help) => note_info(HELP),
            Ok(ReplInput::Mood { mood, note }) => match record_mood(app, &mood, note).await {
                Ok(entry) => note_success(&format!("Recorded mood '{}' for {}", entry.mood, entry.date)),
                Err(e) => note_warn(&format!("Could not record mood: {e:#}")),
            },
            Ok(ReplInput::Style(style)) => {
                let mut settings = session.settings().clone();
                settings.response_style = style;
                session.set_settings(settings);
                ctx = turn_context(app, provider.clone(), printer.clone(), session.settings());
                note_success(&format!("Response style set to {style}"));
            }
            Ok(ReplInput::Attach { path, text }) => match attachment_content(&path, text.as_deref()).await {
                Ok(content) => run_turn(app, &mut session, &ctx, content).await,
                Err(e) => note_warn(&format!("Could not attach file: {e:#}")),
            },
            Ok(ReplInput::Message(text)) => {
                run_turn(app, &mut session, &ctx, MessageContent::Text(text)).await
            }
            Err(msg) => note_warn(&msg),
        }
    }

    note_info(&format!("Conversation saved as {}", session.id()));
    Ok(session.id().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use mindmuse_config::{MindMuseConfig, StorageBackend, StorageConfig};
    use mindmuse_core::StreamErrorKind;
    use mindmuse_stream::{MockOutcome, MockReplyProvider};

    use crate::terminal_output::strip_ansi;

    fn printed(observer: &PrintObserver<Vec<u8>>) -> String {
        let out = observer.out.lock().unwrap();
        strip_ansi(&String::from_utf8_lossy(&out))
    }

    fn memory_app() -> App {
        let config = MindMuseConfig {
            provider: Some(mindmuse_config::ProviderConfig {
                api_key: Some("sk-or-test".into()),
                ..Default::default()
            }),
            storage: Some(StorageConfig {
                backend: Some(StorageBackend::Memory),
                ..Default::default()
            }),
            ..Default::default()
        };
        App::build(config, Path::new("/nonexistent/config.yaml")).unwrap()
    }

    #[test]
    fn parses_repl_commands() {
        assert_eq!(parse_input("  "), Ok(ReplInput::Empty));
        assert_eq!(parse_input("/quit"), Ok(ReplInput::Quit));
        assert_eq!(parse_input("/EXIT"), Ok(ReplInput::Quit));
        assert_eq!(
            parse_input("I feel tired"),
            Ok(ReplInput::Message("I feel tired".into()))
        );
        assert_eq!(
            parse_input("/mood anxious big exam tomorrow"),
            Ok(ReplInput::Mood {
                mood: "anxious".into(),
                note: Some("big exam tomorrow".into())
            })
        );
        assert_eq!(
            parse_input("/mood calm"),
            Ok(ReplInput::Mood { mood: "calm".into(), note: None })
        );
        assert_eq!(
            parse_input("/style concise"),
            Ok(ReplInput::Style(ResponseStyle::Concise))
        );
        assert_eq!(
            parse_input("/attach ~/sketch.png how do I look today"),
            Ok(ReplInput::Attach {
                path: PathBuf::from("~/sketch.png"),
                text: Some("how do I look today".into())
            })
        );
        assert_eq!(
            parse_input("/attach notes.txt"),
            Ok(ReplInput::Attach { path: PathBuf::from("notes.txt"), text: None })
        );
        assert!(parse_input("/attach").is_err());
        assert!(parse_input("/mood").is_err());
        assert!(parse_input("/style loud").is_err());
        assert!(parse_input("/dance").is_err());
    }

    #[tokio::test]
    async fn printer_streams_fragments_then_newline() {
        let printer = PrintObserver::new(Vec::new());
        for delta in ["Hello", " there"] {
            printer
                .on_event("c", &StreamEvent::Update { delta: delta.into(), accumulated: String::new() })
                .await;
        }
        printer.on_event("c", &StreamEvent::Complete { text: "Hello there".into() }).await;
        printer.on_event("c", &StreamEvent::Complete { text: "Second reply".into() }).await;
        assert_eq!(printed(&printer), "MindMuse: Hello there\nMindMuse: Second reply\n");
    }

    #[tokio::test]
    async fn printer_replaces_partial_text_with_fallback() {
        let printer = PrintObserver::new(Vec::new());
        printer
            .on_event("c", &StreamEvent::Update { delta: "Par".into(), accumulated: "Par".into() })
            .await;
        printer
            .on_event(
                "c",
                &StreamEvent::Failed { kind: StreamErrorKind::Transport, fallback: "I'm here.".into() },
            )
            .await;
        assert_eq!(printed(&printer), "MindMuse: Par …\nMindMuse: I'm here.\n");
    }

    #[tokio::test]
    async fn send_streams_reply_and_persists() {
        let app = memory_app();
        let provider = Arc::new(MockReplyProvider::new("mock").with_reply("You are not alone."));
        let printer = Arc::new(PrintObserver::new(Vec::new()));

        let id = run_send(
            &app,
            provider.clone(),
            printer.clone(),
            Some("hi".into()),
            None,
            ChatOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(printed(&printer), "MindMuse: You are not alone.\n");
        let transcript = app.stores.conversations.get(&app.user, &id).await.unwrap().unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(provider.requests()[0].model, app.settings().model);
    }

    #[tokio::test]
    async fn chat_repl_handles_commands_and_turns() {
        let app = memory_app();
        let provider = Arc::new(
            MockReplyProvider::new("mock")
                .with_outcome(MockOutcome::reply("Breathe in slowly."))
                .with_outcome(MockOutcome::http(500)),
        );
        let printer = Arc::new(PrintObserver::new(Vec::new()));
        let input: &[u8] = b"I'm stressed\n/style concise\n/mood anxious exams\nstill stressed\n/quit\nnever sent\n";

        let id = run_chat(
            &app,
            provider.clone(),
            printer.clone(),
            ChatOptions { conversation: Some("chat_repl".into()), ..Default::default() },
            input,
        )
        .await
        .unwrap();
        assert_eq!(id, "chat_repl");

        let output = printed(&printer);
        assert!(output.contains("Breathe in slowly."));
        assert!(output.contains(mindmuse_session::fallback::STRESS_REPLY));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].max_tokens, ResponseStyle::Concise.max_tokens());

        let transcript = app.stores.conversations.get(&app.user, &id).await.unwrap().unwrap();
        assert_eq!(transcript.len(), 4);
        let moods = app.stores.moods.history(&app.user).await.unwrap();
        assert_eq!(moods[0].note.as_deref(), Some("exams"));
    }

    #[tokio::test]
    async fn send_with_image_carries_image_url_part() {
        let app = memory_app();
        let provider = Arc::new(MockReplyProvider::new("mock").with_reply("A bright sunrise."));
        let printer = Arc::new(PrintObserver::new(Vec::new()));
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("sunrise.jpg");
        std::fs::write(&image, [0xFF, 0xD8, 0xFF]).unwrap();

        let id = run_send(&app, provider.clone(), printer, None, Some(&image), ChatOptions::default())
            .await
            .unwrap();

        let request = serde_json::to_value(&provider.requests()[0]).unwrap();
        let user = &request["messages"][1];
        assert_eq!(user["role"], "user");
        assert_eq!(user["content"][0]["text"], crate::attachment::IMAGE_PROMPT);
        assert_eq!(user["content"][1]["type"], "image_url");
        assert_eq!(user["content"][1]["image_url"]["url"], "data:image/jpeg;base64,/9j/");

        let transcript = app.stores.conversations.get(&app.user, &id).await.unwrap().unwrap();
        assert!(transcript.messages()[0].content.has_image());

        let nothing = run_send(
            &app,
            provider.clone(),
            Arc::new(PrintObserver::new(Vec::new())),
            None,
            None,
            ChatOptions::default(),
        )
        .await;
        assert!(nothing.is_err());
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn chat_attach_sends_file_acknowledgement() {
        let app = memory_app();
        let provider = Arc::new(MockReplyProvider::new("mock"));
        let printer = Arc::new(PrintObserver::new(Vec::new()));
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("journal.pdf"), b"%PDF").unwrap();
        let input = format!(
            "/attach {}/missing.png\n/attach {}/journal.pdf\n",
            dir.path().display(),
            dir.path().display()
        );

        run_chat(&app, provider.clone(), printer, ChatOptions::default(), input.as_bytes())
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].messages[1].content,
            MessageContent::Text(crate::attachment::file_acknowledgement("journal.pdf"))
        );
    }

    #[tokio::test]
    async fn chat_resumes_existing_conversation() {
        let app = memory_app();
        let provider: Arc<dyn ReplyProvider> = Arc::new(MockReplyProvider::new("mock"));
        let printer = Arc::new(PrintObserver::new(Vec::new()));
        let options = || ChatOptions { conversation: Some("chat_again".into()), ..Default::default() };

        run_chat(&app, provider.clone(), printer.clone(), options(), &b"first\n"[..]).await.unwrap();
        run_chat(&app, provider.clone(), printer.clone(), options(), &b"second\n"[..]).await.unwrap();

        let transcript = app.stores.conversations.get(&app.user, "chat_again").await.unwrap().unwrap();
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript.messages()[2].text(), "second");
    }
}
