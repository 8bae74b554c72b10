// src/sink/mod.rs
//! Delivery targets for finished items and the concurrent fan-out over them.

pub mod broadcast;
pub mod memory;
pub mod postgres;
pub mod store;

use async_trait::async_trait;
use futures_util::future::join_all;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

use crate::error::SinkError;
use crate::model::NewsItem;

pub use broadcast::{BroadcastBus, BroadcastSink, MemoryBus, RedisBus};
pub use memory::MemoryNewsRepository;
pub use postgres::PgNewsRepository;
pub use store::{NewsQuery, NewsRepository, StoreSink, QUERY_LIMIT};

/// How the fan-out treats a sink failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Failure marks the item as failed.
    Required,
    /// Failure is logged and swallowed.
    BestEffort,
}

#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;
    fn delivery(&self) -> Delivery;
    async fn emit(&self, item: &NewsItem) -> Result<(), SinkError>;
    /// Release resources owned by this sink alone. Called once on shutdown.
    async fn close(&self) {}
}

/// Result of delivering one item to every sink.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub item_id: String,
    /// Required sinks that failed, with the error text.
    pub failed: Vec<(&'static str, String)>,
    /// Best-effort sinks that failed (already logged).
    pub degraded: Vec<&'static str>,
}

impl FanOutReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// All sinks of the pipeline. Every item goes to every sink concurrently.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn Sink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Emits `item` to every sink at once and waits for all of them.
    /// One sink's failure or latency never cancels another sink's emit.
    pub async fn fan_out(&self, item: Arc<NewsItem>) -> FanOutReport {
        let t0 = Instant::now();
        let results = join_all(self.sinks.iter().map(|sink| {
            let item = Arc::clone(&item);
            async move {
                let res = sink.emit(&item).await;
                (sink.name(), sink.delivery(), res)
            }
        }))
        .await;

        let mut report = FanOutReport {
            item_id: item.id.clone(),
            ..Default::default()
        };
        for (name, delivery, res) in results {
            match res {
                Ok(()) => {
                    counter!("sink_emitted_total", "sink" => name).increment(1);
                }
                Err(e) if delivery == Delivery::BestEffort => {
                    tracing::warn!(target: "sink", sink = name, item_id = %item.id, error = %e, "best-effort sink failed; ignored");
                    counter!("sink_failures_total", "sink" => name).increment(1);
                    report.degraded.push(name);
                }
                Err(e) => {
                    tracing::error!(target: "sink", sink = name, item_id = %item.id, error = %e, "required sink failed; item dropped");
                    counter!("sink_failures_total", "sink" => name).increment(1);
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        histogram!("sink_fan_out_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        report
    }

    pub async fn close(&self) {
        for sink in &self.sinks {
            sink.close().await;
        }
    }
}
