//! CLI mood subcommands: record moods, show statistics and history.

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Subcommand;

use mindmuse_core::{MoodEntry, MoodPeriod, MoodStatistics};
use mindmuse_logging::ConversationEvent;

use crate::app::App;
use crate::terminal_output::{note_info, note_success, render_table, Column};

/// Conversation id used for mood events in the event log.
const MOOD_EVENT_SCOPE: &str = "moods";

#[derive(Subcommand)]
pub enum MoodCommands {
    /// Record how you feel today (replaces today's entry)
    Log {
        mood: String,
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Show mood statistics
    Stats,
    /// Show recorded moods, newest first
    History {
        /// week, month, year, or all
        #[arg(short, long, default_value = "all")]
        period: MoodPeriod,
    },
}

pub async fn record_mood(app: &App, mood: &str, note: Option<String>) -> Result<MoodEntry> {
    let mood = mood.trim();
    if mood.is_empty() {
        bail!("mood cannot be empty");
    }
    let entry = MoodEntry::now(mood.to_lowercase(), note.filter(|n| !n.trim().is_empty()));
    app.stores.moods.record(&app.user, entry.clone()).await?;
    app.events.log_event(MOOD_EVENT_SCOPE, ConversationEvent::mood(&entry));
    Ok(entry)
}

pub fn render_stats(stats: &MoodStatistics) -> String {
    if stats.total_entries == 0 {
        return "No moods recorded yet.".to_string();
    }
    let mut out = format!(
        "Entries: {}\nMost frequent: {}\nStreak: {} day(s)\n\n",
        stats.total_entries,
        stats.most_frequent_mood.as_deref().unwrap_or("-"),
        stats.streak
    );
    let rows: Vec<Vec<String>> = stats
        .frequency
        .iter()
        .map(|(mood, count)| vec![mood.clone(), count.to_string()])
        .collect();
    out.push_str(&render_table(&[Column::left("Mood"), Column::right("Count")], &rows));
    out
}

pub fn render_history(entries: &[MoodEntry]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.date.to_string(),
                e.mood.clone(),
                e.note.clone().unwrap_or_default(),
            ]
        })
        .collect();
    render_table(
        &[Column::left("Date"), Column::left("Mood"), Column::left("Note").max_width(48)],
        &rows,
    )
}

pub async fn run(app: &App, cmd: MoodCommands) -> Result<()> {
    let today = Utc::now().date_naive();
    match cmd {
        MoodCommands::Log { mood, note } => {
            let entry = record_mood(app, &mood, note).await?;
            note_success(&format!("Recorded mood '{}' for {}", entry.mood, entry.date));
        }
        MoodCommands::Stats => {
            let stats = app.stores.moods.statistics(&app.user, today).await?;
            print!("{}", render_stats(&stats));
            if stats.total_entries > 0 {
                println!();
            }
        }
        MoodCommands::History { period } => {
            let entries = app.stores.moods.history_for(&app.user, period, today).await?;
            if entries.is_empty() {
                note_info("No moods recorded for this period.");
            } else {
                print!("{}", render_history(&entries));
            }
        }
    }
    Ok(())
}
