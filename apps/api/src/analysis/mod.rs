//! Answer professionalism analysis.
//!
//! Pure text heuristics run on a candidate's answer (typed or transcribed):
//! filler-word counts, a lexicon sentiment label, word count, and a score
//! combining them.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod handlers;

pub const FILLER_WORDS: &[&str] = &[
    "um", "uh", "like", "you know", "so", "actually", "basically", "literally", "well", "hmm",
    "er", "ah", "okay", "right", "i mean",
];

/// Only this many characters are considered for sentiment.
pub const SENTIMENT_WINDOW_CHARS: usize = 512;

const POSITIVE_WORDS: &[&str] = &[
    "achieved", "enjoy", "enjoyed", "excited", "excellent", "glad", "good", "great", "happy",
    "improved", "love", "loved", "passionate", "proud", "solved", "success", "successful",
    "thrilled", "delivered", "learned", "grew", "effective", "confident", "best", "win",
];

const NEGATIVE_WORDS: &[&str] = &[
    "awful", "bad", "boring", "failed", "failure", "frustrated", "frustrating", "hate", "hated",
    "horrible", "terrible", "worst", "annoying", "angry", "stupid", "useless", "never", "problem",
    "difficult", "blame", "quit", "unfortunately", "poor", "weak", "lost",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// Confidence in `label`, 0.5..=1.0.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FillerReport {
    pub total_fillers: usize,
    pub details: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessionalismReport {
    pub sentiment: Sentiment,
    pub filler_words: FillerReport,
    pub word_count: usize,
    pub professionalism_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

fn single_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let alternation = FILLER_WORDS
            .iter()
            .filter(|w| !w.contains(' '))
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        // Built from the constant list above.
        Regex::new(&format!(r"\b(?:{alternation})\b")).expect("filler pattern compiles")
    })
}

/// Single words count on word boundaries, phrases as plain substrings.
pub fn count_filler_words(text: &str) -> FillerReport {
    let lower = text.to_lowercase();
    let mut details: BTreeMap<&'static str, usize> =
        FILLER_WORDS.iter().map(|w| (*w, 0)).collect();

    for m in single_word_pattern().find_iter(&lower) {
        if let Some(word) = FILLER_WORDS.iter().find(|w| **w == m.as_str()) {
            *details.entry(*word).or_default() += 1;
        }
    }
    for phrase in FILLER_WORDS.iter().filter(|w| w.contains(' ')) {
        details.insert(*phrase, lower.matches(*phrase).count());
    }

    FillerReport {
        total_fillers: details.values().sum(),
        details,
    }
}

/// Lexicon sentiment over the first [`SENTIMENT_WINDOW_CHARS`] characters.
/// Ties (including no hits) are `Positive` at 0.5.
pub fn analyze_sentiment(text: &str) -> Sentiment {
    let window: String = text.chars().take(SENTIMENT_WINDOW_CHARS).collect();
    let window = window.to_lowercase();

    let (mut positive, mut negative) = (0usize, 0usize);
    for token in window.split(|c: char| !c.is_alphanumeric() && c != '\'') {
        if POSITIVE_WORDS.iter().any(|w| *w == token) {
            positive += 1;
        } else if NEGATIVE_WORDS.iter().any(|w| *w == token) {
            negative += 1;
        }
    }

    let hits = positive + negative;
    if hits == 0 {
        return Sentiment {
            label: SentimentLabel::Positive,
            score: 0.5,
        };
    }
    let margin = positive.abs_diff(negative) as f64 / hits as f64;
    Sentiment {
        label: if negative > positive {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Positive
        },
        score: round2(0.5 + margin / 2.0),
    }
}

pub fn analyze_professionalism(text: &str) -> ProfessionalismReport {
    let sentiment = analyze_sentiment(text);
    let filler_words = count_filler_words(text);
    let word_count = text.split_whitespace().count();

    let mut score = 1.0 - 0.2 * filler_words.total_fillers as f64;
    if sentiment.label == SentimentLabel::Negative {
        score -= 0.2;
    }
    if word_count > 20 {
        score += 0.1;
    }

    ProfessionalismReport {
        sentiment,
        filler_words,
        word_count,
        professionalism_score: round2(score.max(0.0)),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
