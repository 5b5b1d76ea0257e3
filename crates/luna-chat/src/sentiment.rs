//! Lexicon-based sentiment scoring for mood hints.
//!
//! Scores user input with a small positive/negative word list and maps it
//! onto a coarse mood, which the UI uses to switch companion expressions.
//! Advisory only: a wrong mood never affects the reply itself.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse mood derived from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Neutral,
    Happy,
    Sad,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mood::Neutral => write!(f, "neutral"),
            Mood::Happy => write!(f, "happy"),
            Mood::Sad => write!(f, "sad"),
        }
    }
}

impl Mood {
    /// Map a sentiment score onto a mood. Thresholds at ±2 match the
    /// expression-switch behavior of the web UI.
    pub fn from_score(score: i32) -> Self {
        if score >= 2 {
            Mood::Happy
        } else if score <= -2 {
            Mood::Sad
        } else {
            Mood::Neutral
        }
    }
}

const POSITIVE: &[&str] = &[
    "love", "loved", "happy", "great", "good", "wonderful", "awesome", "amazing", "joy", "fun",
    "excited", "nice", "best", "glad", "thanks", "thank", "cool", "yay", "sweet", "beautiful",
];

const NEGATIVE: &[&str] = &[
    "sad", "bad", "hate", "hated", "awful", "terrible", "angry", "upset", "lonely", "cry",
    "crying", "worst", "tired", "sick", "scared", "worried", "hurt", "depressed", "miss", "pain",
];

/// Score text: +1 per positive word, -1 per negative word.
pub fn score(text: &str) -> i32 {
    let mut total = 0;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if POSITIVE.contains(&word.as_str()) {
            total += 1;
        } else if NEGATIVE.contains(&word.as_str()) {
            total -= 1;
        }
    }
    total
}

/// Convenience: score text and map straight to a mood.
pub fn mood_of(text: &str) -> Mood {
    Mood::from_score(score(text))
}
