mod app;
mod attachment;
mod chat_cmd;
mod config_cmd;
mod history_cmd;
mod mood_cmd;
mod speech;
mod terminal_output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use mindmuse_config::{config_dir, config_file_path, load_and_prepare, validate, MindMuseConfig};
use mindmuse_core::ResponseStyle;
use mindmuse_logging::init_logger;
use mindmuse_stream::{ReplyProvider, StreamingReplyConsumer};

use app::App;
use chat_cmd::{ChatOptions, PrintObserver};
use config_cmd::ConfigCommands;
use history_cmd::HistoryCommands;
use mood_cmd::MoodCommands;

#[derive(Parser)]
#[command(name = "mindmuse")]
#[command(about = "MindMuse: a mental health companion for your terminal")]
#[command(version)]
struct Cli {
    /// Config file (default: $MINDMUSE_CONFIG_DIR/config.yaml or ~/.mindmuse/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk with MindMuse
    Chat {
        /// Continue (or start) the conversation with this id
        #[arg(short, long)]
        conversation: Option<String>,
        /// concise, balanced, or detailed
        #[arg(short, long)]
        style: Option<ResponseStyle>,
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Send one message and print the reply
    Send {
        #[arg(required_unless_present = "image")]
        message: Option<String>,
        /// Attach an image (or name another file) with the message
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// Stored conversations
    #[command(subcommand)]
    History(HistoryCommands),
    /// Mood tracking
    #[command(subcommand)]
    Mood(MoodCommands),
    /// Inspect or edit the config file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| config_file_path(&config_dir()));

    // Config commands must work even when the file does not validate.
    let command = match cli.command {
        Commands::Config(cmd) => return config_cmd::run(&config_path, cmd).await,
        other => other,
    };

    let config = load_and_prepare(&config_path).await?;
    init_logging(&config)?;
    let app = App::build(config, &config_path)?;
    let provider: Arc<dyn ReplyProvider> =
        Arc::new(StreamingReplyConsumer::with_read_timeout(app.read_timeout())?);
    let printer = Arc::new(PrintObserver::stdout());

    match command {
        Commands::Chat { conversation, style, model } => {
            let options = ChatOptions { conversation, style, model };
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            chat_cmd::run_chat(&app, provider, printer, options, stdin).await?;
        }
        Commands::Send { message, image, conversation } => {
            let options = ChatOptions { conversation, ..Default::default() };
            let id =
                chat_cmd::run_send(&app, provider, printer, message, image.as_deref(), options)
                    .await?;
            terminal_output::note_info(&format!("Continue with: mindmuse chat --conversation {id}"));
        }
        Commands::History(cmd) => history_cmd::run(&app, cmd).await?,
        Commands::Mood(cmd) => mood_cmd::run(&app, cmd).await?,
        Commands::Config(_) => {}
    }

    Ok(())
}

fn init_logging(config: &MindMuseConfig) -> Result<()> {
    let log_dir = config
        .logging
        .as_ref()
        .and_then(|l| l.dir.clone())
        .unwrap_or_else(|| config_dir().join(mindmuse_config::defaults::DEFAULT_LOG_DIR));
    init_logger(&log_dir, &config.log_level())?;

    // Loading ran before the subscriber existed; repeat the warnings now.
    for warning in validate(config).warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }
    Ok(())
}
