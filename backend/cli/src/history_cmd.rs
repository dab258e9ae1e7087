//! CLI history subcommands: list, show and delete stored conversations.

use anyhow::{bail, Result};
use clap::Subcommand;

use mindmuse_core::ConversationSummary;

use crate::app::App;
use crate::terminal_output::{note_info, note_success, render_message, render_table, Column};

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List conversations, most recent first
    List,
    /// Print every message of a conversation
    Show { id: String },
    /// Delete a conversation
    Delete { id: String },
}

pub fn render_list(conversations: &[ConversationSummary]) -> String {
    let rows: Vec<Vec<String>> = conversations
        .iter()
        .map(|c| {
            vec![
                c.id.clone(),
                c.title.clone(),
                c.last_updated.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    render_table(
        &[
            Column::left("Id"),
            Column::left("Title").max_width(40),
            Column::left("Last updated"),
        ],
        &rows,
    )
}

pub async fn run(app: &App, cmd: HistoryCommands) -> Result<()> {
    let store = &app.stores.conversations;
    match cmd {
        HistoryCommands::List => {
            let conversations = store.list_all(&app.user).await?;
            if conversations.is_empty() {
                note_info("No conversations yet. Start one with `mindmuse chat`.");
            } else {
                print!("{}", render_list(&conversations));
            }
        }
        HistoryCommands::Show { id } => {
            let Some(transcript) = store.get(&app.user, &id).await? else {
                bail!("conversation '{id}' not found");
            };
            note_info(&transcript.title());
            for message in transcript.messages() {
                println!("{}", render_message(message));
            }
        }
        HistoryCommands::Delete { id } => {
            if store.get(&app.user, &id).await?.is_none() {
                bail!("conversation '{id}' not found");
            }
            store.delete(&app.user, &id).await?;
            note_success(&format!("Deleted conversation {id}"));
        }
    }
    Ok(())
}
