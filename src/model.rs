// src/model.rs
//! The enriched news record that flows through every pipeline stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Baseline confidence assigned before the sentiment stage runs.
pub const BASELINE_CONFIDENCE: f64 = 0.5;
/// Upper bound of the relevance score.
pub const MAX_RELEVANCE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketImpact {
    #[default]
    Low,
    Medium,
    High,
}

impl MarketImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketImpact::Low => "low",
            MarketImpact::Medium => "medium",
            MarketImpact::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(MarketImpact::Low),
            "medium" => Some(MarketImpact::Medium),
            "high" => Some(MarketImpact::High),
            _ => None,
        }
    }
}

impl fmt::Display for MarketImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named entities found in the item text. All three keys always serialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub companies: BTreeSet<String>,
    #[serde(default)]
    pub indices: BTreeSet<String>,
    #[serde(default)]
    pub regulators: BTreeSet<String>,
}

/// Raw numeric tokens in match order (duplicates kept).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Numbers {
    #[serde(default)]
    pub percentages: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub points: Vec<String>,
}

/// A news record. Built once by an ingestion source, rewritten by each
/// transform stage, then frozen behind an `Arc` before it reaches the sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub source: String,
    pub title: String,
    pub url: String,
    pub published_at: String, // ISO-8601
    pub summary: Option<String>,
    pub content: Option<String>,
    pub categories: BTreeSet<String>,
    pub sentiment: Sentiment,
    pub sentiment_confidence: f64,
    pub relevance: u8,
    pub market_impact: MarketImpact,
    pub entities: Entities,
    pub numbers: Numbers,
}

impl NewsItem {
    /// New item carrying the baseline enrichment values.
    pub fn new(id: impl Into<String>, source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            title: title.into(),
            url: String::new(),
            published_at: String::new(),
            summary: None,
            content: None,
            categories: BTreeSet::new(),
            sentiment: Sentiment::Neutral,
            sentiment_confidence: BASELINE_CONFIDENCE,
            relevance: 0,
            market_impact: MarketImpact::Low,
            entities: Entities::default(),
            numbers: Numbers::default(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_published_at(mut self, ts: impl Into<String>) -> Self {
        self.published_at = ts.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_categories<I, S>(mut self, cats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = cats.into_iter().map(Into::into).collect();
        self
    }

    /// Title, summary and content joined by single spaces; empty parts skipped.
    pub fn analysis_text(&self) -> String {
        [
            Some(self.title.as_str()),
            self.summary.as_deref(),
            self.content.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Stores a confidence clamped into `[0, 1]`; NaN becomes 0.
    pub fn set_sentiment_confidence(&mut self, value: f64) {
        self.sentiment_confidence = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
    }

    /// Stores a relevance clamped into `[0, 100]`.
    pub fn set_relevance(&mut self, score: i64) {
        self.relevance = score.clamp(0, MAX_RELEVANCE as i64) as u8;
    }

    /// Invariants every item handed to a sink must satisfy.
    pub fn check_invariants(&self) -> bool {
        (0.0..=1.0).contains(&self.sentiment_confidence) && self.relevance <= MAX_RELEVANCE
    }
}
