//! Canned supportive replies used when the model cannot be reached.

use std::sync::LazyLock;

use regex::Regex;

pub const GREETING_REPLY: &str = "Hello! How can I help you today?";
pub const SADNESS_REPLY: &str =
    "I'm sorry to hear you're feeling down. Would you like to talk more about what's troubling you?";
pub const ANXIETY_REPLY: &str =
    "Anxiety can be challenging. Would you like to try a breathing exercise?";
pub const STRESS_REPLY: &str =
    "It sounds like you're feeling stressed. Taking a short break might help.";
pub const DEFAULT_REPLY: &str =
    "I'm here to support you. Tell me more about how you're feeling.";

// "hi" is matched as a word so that "this" or "think" do not greet.
static HI_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bhi\b").unwrap());

enum Keyword {
    Substring(&'static str),
    Word(&'static LazyLock<Regex>),
}

impl Keyword {
    fn matches(&self, lowered: &str) -> bool {
        match self {
            Keyword::Substring(needle) => lowered.contains(needle),
            Keyword::Word(re) => re.is_match(lowered),
        }
    }
}

struct Rule {
    keywords: &'static [Keyword],
    reply: &'static str,
}

static RULES: &[Rule] = &[
    Rule {
        keywords: &[Keyword::Substring("hello"), Keyword::Word(&HI_WORD)],
        reply: GREETING_REPLY,
    },
    Rule {
        keywords: &[Keyword::Substring("sad"), Keyword::Substring("depressed")],
        reply: SADNESS_REPLY,
    },
    Rule {
        keywords: &[Keyword::Substring("anxious"), Keyword::Substring("anxiety")],
        reply: ANXIETY_REPLY,
    },
    Rule {
        keywords: &[Keyword::Substring("stressed"), Keyword::Substring("stress")],
        reply: STRESS_REPLY,
    },
];

/// Keyword table over the last user message; first matching rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPolicy;

impl FallbackPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn respond(&self, last_user_text: Option<&str>) -> &'static str {
        let Some(text) = last_user_text else {
            return DEFAULT_REPLY;
        };
        let lowered = text.to_lowercase();
        RULES
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| k.matches(&lowered)))
            .map(|rule| rule.reply)
            .unwrap_or(DEFAULT_REPLY)
    }
}
