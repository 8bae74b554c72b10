// src/transform/entities.rs
//! Entity and numeric-token extraction.
//!
//! Entities come from fixed reference lists matched as lower-case
//! substrings. Numbers are pulled with regexes from the original-case text
//! and kept verbatim, in match order, duplicates included.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::Transform;
use crate::keywords::{COMPANIES, INDICES, REGULATORS};
use crate::model::{Entities, NewsItem, Numbers};

static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\b\d+(?:\.\d+)?\s?%").expect("percent regex"));

// Grouped thousands only; a bare 4+ digit run such as a year is not an amount.
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[₹$€£]\s?)?\b\d{1,3}(?:,\d{3})*(?:\.\d+)?\b").expect("amount regex")
});

static POINTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s?(?:pts?|points?)\b").expect("points regex")
});

fn matching_entries(lower_text: &str, list: &[&str]) -> BTreeSet<String> {
    list.iter()
        .filter(|entry| lower_text.contains(&entry.to_lowercase()))
        .map(|entry| (*entry).to_string())
        .collect()
}

fn all_matches(re: &Regex, text: &str) -> Vec<String> {
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub fn extract_entities(text: &str) -> Entities {
    let lower = text.to_lowercase();
    Entities {
        companies: matching_entries(&lower, COMPANIES),
        indices: matching_entries(&lower, INDICES),
        regulators: matching_entries(&lower, REGULATORS),
    }
}

pub fn extract_numbers(text: &str) -> Numbers {
    Numbers {
        percentages: all_matches(&PERCENT_RE, text),
        amounts: all_matches(&AMOUNT_RE, text),
        points: all_matches(&POINTS_RE, text),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EntityStage;

impl Transform for EntityStage {
    fn name(&self) -> &'static str {
        "entities"
    }

    fn apply(&self, mut item: NewsItem) -> NewsItem {
        let text = item.analysis_text();
        item.entities = extract_entities(&text);
        item.numbers = extract_numbers(&text);
        item
    }
}
