// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod ingest;
pub mod keywords;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod retry;
pub mod sink;
pub mod transform;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::PipelineConfig;
pub use crate::model::{Entities, MarketImpact, NewsItem, Numbers, Sentiment};
pub use crate::pipeline::{CycleReport, Pipeline, RunnerState};
