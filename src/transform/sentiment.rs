// src/transform/sentiment.rs
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};

use super::Transform;
use crate::keywords::CATEGORY_KEYWORDS;
use crate::model::{NewsItem, Sentiment};

/// Only the first 5000 characters of the text are scored.
pub const MAX_SENTIMENT_CHARS: usize = 5000;
/// Compound scores strictly above/below ±threshold are polar.
pub const POLARITY_THRESHOLD: f64 = 0.15;

// Normalization constant for sum / sqrt(sum^2 + alpha).
const ALPHA: f64 = 15.0;
// Valence multiplier for a negated word.
const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;

static LEXICON: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, f64>>(raw).expect("valid sentiment lexicon")
});

/// Lexicon/rule based polarity scorer.
#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_valence(&self, w: &str) -> f64 {
        LEXICON.get(w).copied().unwrap_or(0.0)
    }

    /// Compound polarity in `[-1, 1]`.
    ///
    /// Rules: a negator in the previous three tokens flips and damps the
    /// valence; a preceding booster word amplifies it; words before a "but"
    /// count half and words after it count one and a half.
    pub fn compound(&self, text: &str) -> f64 {
        let tokens: Vec<String> = tokenize(text).collect();
        let but_at = tokens.iter().position(|t| t == "but");

        let mut sum = 0.0;
        for (i, tok) in tokens.iter().enumerate() {
            let base = self.word_valence(tok);
            if base == 0.0 {
                continue;
            }
            let mut v = base;

            if i >= 1 {
                if let Some(boost) = booster(&tokens[i - 1]) {
                    v += if v > 0.0 { boost } else { -boost };
                }
            }

            let negated = (1..=3).any(|k| i >= k && is_negator(&tokens[i - k]));
            if negated {
                v *= NEGATION_SCALAR;
            }

            if let Some(b) = but_at {
                if i < b {
                    v *= 0.5;
                } else if i > b {
                    v *= 1.5;
                }
            }
            sum += v;
        }

        normalize(sum)
    }
}

fn normalize(sum: f64) -> f64 {
    if sum == 0.0 {
        return 0.0;
    }
    (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Alphanumeric tokens, lower-cased. Apostrophes stay inside words so
/// contractions like "isn't" survive as one token.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "without"
            | "nor"
            | "didn't"
            | "doesn't"
            | "don't"
    )
}

fn booster(tok: &str) -> Option<f64> {
    match tok {
        "very" | "sharply" | "significantly" | "strongly" | "hugely" | "extremely" => {
            Some(BOOSTER_INCREMENT)
        }
        "slightly" | "marginally" | "somewhat" => Some(-BOOSTER_INCREMENT),
        _ => None,
    }
}

/// Truncates to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Categories whose keyword set has at least one case-insensitive hit.
pub fn categorize(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, kws)| kws.iter().any(|k| lower.contains(k)))
        .map(|(cat, _)| (*cat).to_string())
        .collect()
}

/// Sets `sentiment`, `sentiment_confidence` and `categories`.
#[derive(Debug, Clone, Default)]
pub struct SentimentStage {
    analyzer: SentimentAnalyzer,
}

impl SentimentStage {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentAnalyzer::new(),
        }
    }
}

impl Transform for SentimentStage {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn apply(&self, mut item: NewsItem) -> NewsItem {
        let full = item.analysis_text();
        let text = truncate_chars(&full, MAX_SENTIMENT_CHARS);

        let score = self.analyzer.compound(text);
        item.sentiment = if score > POLARITY_THRESHOLD {
            Sentiment::Positive
        } else if score < -POLARITY_THRESHOLD {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };
        item.set_sentiment_confidence(score.abs().min(1.0));

        // No keyword hit keeps whatever categories the source supplied.
        let cats = categorize(text);
        if !cats.is_empty() {
            item.categories = cats;
        }
        item
    }
}
