// src/transform/mod.rs
//! Enrichment chain: Sentiment → Entities → Relevance → Market-Impact.
//!
//! Every stage takes the item by value and returns it with its own fields
//! rewritten. Stages are pure: no I/O, no errors.

pub mod entities;
pub mod impact;
pub mod relevance;
pub mod sentiment;

use crate::model::NewsItem;

pub use entities::EntityStage;
pub use impact::MarketImpactStage;
pub use relevance::RelevanceStage;
pub use sentiment::SentimentStage;

/// One enrichment step.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, item: NewsItem) -> NewsItem;
}

/// Ordered list of stages applied to every item.
pub struct TransformChain {
    stages: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    /// The production order. Market-Impact reads the output of Entities and Relevance,
    /// so it must stay last.
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(SentimentStage::new()),
                Box::new(EntityStage),
                Box::new(RelevanceStage),
                Box::new(MarketImpactStage),
            ],
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn apply(&self, item: NewsItem) -> NewsItem {
        let id = item.id.clone();
        let out = self.stages.iter().fold(item, |acc, stage| stage.apply(acc));
        debug_assert_eq!(out.id, id, "transform stages must not touch the id");
        tracing::trace!(target: "transform", item_id = %out.id, relevance = out.relevance, impact = %out.market_impact, "enriched");
        out
    }
}

impl Default for TransformChain {
    fn default() -> Self {
        Self::standard()
    }
}
