use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default chat model when settings do not name one.
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.7-sonnet";

const ANONYMOUS: &str = "anonymous";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// How long and how warm replies should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Concise,
    #[default]
    Balanced,
    Detailed,
}

impl ResponseStyle {
    pub fn max_tokens(&self) -> u32 {
        match self {
            ResponseStyle::Concise => 250,
            ResponseStyle::Balanced => 400,
            ResponseStyle::Detailed => 500,
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            ResponseStyle::Concise => 0.5,
            ResponseStyle::Balanced => 0.7,
            ResponseStyle::Detailed => 0.8,
        }
    }

    /// Extra instruction appended to the system prompt.
    pub fn prompt_suffix(&self) -> Option<&'static str> {
        match self {
            ResponseStyle::Concise => Some(" Keep your responses brief and to the point."),
            ResponseStyle::Balanced => None,
            ResponseStyle::Detailed => Some(
                " Provide detailed explanations and additional context in your responses.",
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStyle::Concise => "concise",
            ResponseStyle::Balanced => "balanced",
            ResponseStyle::Detailed => "detailed",
        }
    }
}

impl FromStr for ResponseStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concise" => Ok(ResponseStyle::Concise),
            "balanced" => Ok(ResponseStyle::Balanced),
            "detailed" => Ok(ResponseStyle::Detailed),
            other => Err(format!(
                "unknown response style '{other}'; use concise, balanced, or detailed"
            )),
        }
    }
}

impl fmt::Display for ResponseStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing preferences that shape each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub model: String,
    pub response_style: ResponseStyle,
    pub voice_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            response_style: ResponseStyle::default(),
            voice_enabled: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Users and conversations
// ---------------------------------------------------------------------------

/// Storage key for the person owning the data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserKey {
    Signed(String),
    Anonymous,
}

impl UserKey {
    pub fn from_identity(user_id: Option<String>) -> Self {
        match user_id {
            Some(id) if !id.trim().is_empty() => UserKey::Signed(id),
            _ => UserKey::Anonymous,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UserKey::Signed(id) => id,
            UserKey::Anonymous => ANONYMOUS,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, UserKey::Signed(_))
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing entry for a stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mood tracking
// ---------------------------------------------------------------------------

/// One recorded mood. At most one entry is kept per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub date: NaiveDate,
    pub mood: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MoodEntry {
    pub fn now(mood: impl Into<String>, note: Option<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            date: timestamp.date_naive(),
            mood: mood.into(),
            note,
            timestamp,
        }
    }
}

/// Window used when listing mood history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoodPeriod {
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl MoodPeriod {
    /// Earliest date included in the period, or `None` for everything.
    pub fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        let days = match self {
            MoodPeriod::Week => 7,
            MoodPeriod::Month => 30,
            MoodPeriod::Year => 365,
            MoodPeriod::All => return None,
        };
        Some(today - Duration::days(days))
    }

    pub fn contains(&self, date: NaiveDate, today: NaiveDate) -> bool {
        self.cutoff(today).map_or(true, |cutoff| date >= cutoff)
    }
}

impl FromStr for MoodPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "week" => Ok(MoodPeriod::Week),
            "month" => Ok(MoodPeriod::Month),
            "year" => Ok(MoodPeriod::Year),
            "all" => Ok(MoodPeriod::All),
            other => Err(format!("unknown period '{other}'; use week, month, year, or all")),
        }
    }
}

/// Aggregate view over a user's mood history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodStatistics {
    pub total_entries: usize,
    pub most_frequent_mood: Option<String>,
    pub frequency: BTreeMap<String, usize>,
    /// Consecutive days with an entry, ending today. Zero when today has none.
    pub streak: u32,
}

impl MoodStatistics {
    pub fn compute(entries: &[MoodEntry], today: NaiveDate) -> Self {
        if entries.is_empty() {
            return Self::default();
        }

        let mut frequency = BTreeMap::new();
        for entry in entries {
            *frequency.entry(entry.mood.clone()).or_insert(0) += 1;
        }

        // Ties go to the alphabetically first mood.
        let most_frequent_mood = frequency
            .iter()
            .fold(None::<(&String, usize)>, |best, (mood, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((mood, count)),
            })
            .map(|(mood, _)| mood.clone());

        let mut dates: Vec<NaiveDate> = entries.iter().map(|e| e.date).collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();

        let mut streak = 0;
        let mut expected = today;
        for date in dates {
            if date > today {
                continue;
            }
            if date != expected {
                break;
            }
            streak += 1;
            expected = expected - Duration::days(1);
        }

        Self {
            total_entries: entries.len(),
            most_frequent_mood,
            frequency,
            streak,
        }
    }
}
