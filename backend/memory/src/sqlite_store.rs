/// SQLite-backed durable conversation and mood store.
///
/// Conversations live in a `conversations` table (one row per user and
/// conversation, carrying the listing title and last update) and their
/// messages in `messages`, each stored as a JSON document in arrival order.
/// Moods are one row per user and date in `moods`.
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, info};

use mindmuse_core::{
    ChatMessage, ConversationStore, ConversationSummary, MoodEntry, MoodStore, Transcript, UserKey,
    UNTITLED,
};

use crate::store::sort_newest_first;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS conversations (
        user_key     TEXT NOT NULL,
        id           TEXT NOT NULL,
        title        TEXT NOT NULL,
        last_updated TEXT NOT NULL,
        PRIMARY KEY (user_key, id)
    );
    CREATE TABLE IF NOT EXISTS messages (
        seq             INTEGER PRIMARY KEY AUTOINCREMENT,
        user_key        TEXT NOT NULL,
        conversation_id TEXT NOT NULL,
        body            TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages(user_key, conversation_id, seq);
    CREATE TABLE IF NOT EXISTS moods (
        user_key  TEXT NOT NULL,
        date      TEXT NOT NULL,
        mood      TEXT NOT NULL,
        note      TEXT,
        timestamp TEXT NOT NULL,
        PRIMARY KEY (user_key, date)
    );";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("failed to open SQLite database {:?}", path.as_ref()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("failed to enable WAL journal")?;
        conn.execute_batch(SCHEMA)
            .context("failed to initialize schema")?;

        info!("SqliteStore opened at {:?}", path.as_ref());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn upsert_conversation(
    conn: &Connection,
    user: &str,
    id: &str,
    title: &str,
    last_updated: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO conversations (user_key, id, title, last_updated) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_key, id) DO UPDATE SET title = ?3, last_updated = ?4",
        params![user, id, title, to_text(last_updated)],
    )?;
    Ok(())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get(&self, user: &UserKey, conversation_id: &str) -> Result<Option<Transcript>> {
        let conn = self.conn.lock().await;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM conversations WHERE user_key = ?1 AND id = ?2",
                params![user.as_str(), conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT body FROM messages WHERE user_key = ?1 AND conversation_id = ?2 ORDER BY seq",
        )?;
        let bodies = stmt
            .query_map(params![user.as_str(), conversation_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let messages = bodies
            .iter()
            .map(|body| serde_json::from_str::<ChatMessage>(body))
            .collect::<serde_json::Result<Vec<_>>>()
            .with_context(|| format!("corrupt message in conversation '{conversation_id}'"))?;
        Ok(Some(Transcript::from_messages(messages)))
    }

    async fn set(
        &self,
        user: &UserKey,
        conversation_id: &str,
        transcript: &Transcript,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE user_key = ?1 AND conversation_id = ?2",
            params![user.as_str(), conversation_id],
        )?;
        for message in transcript.messages() {
            tx.execute(
                "INSERT INTO messages (user_key, conversation_id, body) VALUES (?1, ?2, ?3)",
                params![user.as_str(), conversation_id, serde_json::to_string(message)?],
            )?;
        }
        upsert_conversation(
            &tx,
            user.as_str(),
            conversation_id,
            &transcript.title(),
            transcript.last_updated().unwrap_or_else(Utc::now),
        )?;
        tx.commit()?;
        debug!(conversation_id, messages = transcript.len(), "replaced conversation");
        Ok(())
    }

    async fn append(
        &self,
        user: &UserKey,
        conversation_id: &str,
        message: &ChatMessage,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT title FROM conversations WHERE user_key = ?1 AND id = ?2",
                params![user.as_str(), conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        let title = match current {
            Some(title) if title != UNTITLED => title,
            _ => Transcript::from_messages(vec![message.clone()]).title(),
        };

        tx.execute(
            "INSERT INTO messages (user_key, conversation_id, body) VALUES (?1, ?2, ?3)",
            params![user.as_str(), conversation_id, serde_json::to_string(message)?],
        )?;
        upsert_conversation(&tx, user.as_str(), conversation_id, &title, message.timestamp)?;
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, user: &UserKey, conversation_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE user_key = ?1 AND conversation_id = ?2",
            params![user.as_str(), conversation_id],
        )?;
        tx.execute(
            "DELETE FROM conversations WHERE user_key = ?1 AND id = ?2",
            params![user.as_str(), conversation_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn list_all(&self, user: &UserKey) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, title, last_updated FROM conversations WHERE user_key = ?1",
        )?;
        let mut summaries = stmt
            .query_map(params![user.as_str()], |row| {
                let raw: String = row.get(2)?;
                Ok(ConversationSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    last_updated: parse_timestamp(&raw)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }
}

#[async_trait]
impl MoodStore for SqliteStore {
    async fn record(&self, user: &UserKey, entry: MoodEntry) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO moods (user_key, date, mood, note, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.as_str(),
                entry.date.to_string(),
                entry.mood,
                entry.note,
                to_text(entry.timestamp),
            ],
        )?;
        debug!(date = %entry.date, mood = %entry.mood, "recorded mood");
        Ok(())
    }

    async fn history(&self, user: &UserKey) -> Result<Vec<MoodEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT date, mood, note, timestamp FROM moods WHERE user_key = ?1 ORDER BY date DESC",
        )?;
        let entries = stmt
            .query_map(params![user.as_str()], row_to_mood)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

fn row_to_mood(row: &rusqlite::Row) -> rusqlite::Result<MoodEntry> {
    let date: String = row.get(0)?;
    let timestamp: String = row.get(3)?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(MoodEntry {
        date,
        mood: row.get(1)?,
        note: row.get(2)?,
        timestamp: parse_timestamp(&timestamp)?,
    })
}
