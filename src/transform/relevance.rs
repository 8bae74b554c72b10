// src/transform/relevance.rs
use super::Transform;
use crate::keywords::RELEVANCE_WEIGHTS;
use crate::model::NewsItem;

/// Sum of weights of every keyword found in `text`, clamped to `[0, 100]`.
/// Overlapping keywords ("nifty" inside "bank nifty") each count.
pub fn relevance_score(text: &str) -> u8 {
    let lower = text.to_lowercase();
    let sum: i64 = RELEVANCE_WEIGHTS
        .iter()
        .filter(|(kw, _)| lower.contains(kw))
        .map(|(_, w)| *w)
        .sum();
    sum.clamp(0, 100) as u8
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceStage;

impl Transform for RelevanceStage {
    fn name(&self) -> &'static str {
        "relevance"
    }

    fn apply(&self, mut item: NewsItem) -> NewsItem {
        item.set_relevance(relevance_score(&item.analysis_text()) as i64);
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rbi_sensex_nifty_is_seventy() {
        assert_eq!(relevance_score("rbi keeps repo steady; sensex and nifty flat"), 70);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(relevance_score("SEBI tightens IPO norms"), 30);
    }

    #[test]
    fn score_is_clamped_at_100() {
        let text = "rbi sebi sensex bank nifty rate hike rate cut inflation gdp earnings merger";
        assert_eq!(relevance_score(text), 100);
    }

    #[test]
    fn unrelated_text_scores_zero() {
        assert_eq!(relevance_score("Local bakery opens new branch"), 0);
    }
}
