// src/transform/impact.rs
use super::Transform;
use crate::model::{MarketImpact, NewsItem};

pub const HIGH_RELEVANCE: u8 = 70;
pub const HIGH_RELEVANCE_WITH_INDEX: u8 = 50;
pub const MEDIUM_RELEVANCE: u8 = 40;

/// Tier from relevance plus presence of an index mention.
pub fn assess(relevance: u8, has_index: bool) -> MarketImpact {
    if relevance >= HIGH_RELEVANCE || (has_index && relevance >= HIGH_RELEVANCE_WITH_INDEX) {
        MarketImpact::High
    } else if relevance >= MEDIUM_RELEVANCE {
        MarketImpact::Medium
    } else {
        MarketImpact::Low
    }
}

/// Must run after the entity and relevance stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketImpactStage;

impl Transform for MarketImpactStage {
    fn name(&self) -> &'static str {
        "market_impact"
    }

    fn apply(&self, mut item: NewsItem) -> NewsItem {
        item.market_impact = assess(item.relevance, !item.entities.indices.is_empty());
        item
    }
}
