// src/pipeline.rs
//! The runner: fetch, enrich, fan out, commit, repeat until told to stop.

use futures_util::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::ingest::types::RawRecord;
use crate::ingest::IngestionSource;
use crate::model::NewsItem;
use crate::sink::{FanOutReport, SinkSet};
use crate::transform::TransformChain;

/// Pause after a failed pull before trying again.
const PULL_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Fetching,
    Transforming,
    Emitting,
    Draining,
    Stopped,
}

/// Outcome of one fetch/transform/emit cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    /// Items the store accepted.
    pub emitted: usize,
    /// Items dropped because the store failed.
    pub failed: usize,
    /// Items whose best-effort delivery failed.
    pub degraded: usize,
}

impl CycleReport {
    fn absorb(&mut self, other: &CycleReport) {
        self.fetched += other.fetched;
        self.emitted += other.emitted;
        self.failed += other.failed;
        self.degraded += other.degraded;
    }
}

/// Totals over a whole `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub totals: CycleReport,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_cycles_total", "Completed pipeline cycles.");
        describe_counter!("pipeline_items_total", "Items that completed the transform chain.");
        describe_counter!("pipeline_items_failed_total", "Items dropped after a store failure.");
        describe_counter!("pipeline_pull_errors_total", "Source pulls that returned an error.");
        describe_counter!("pipeline_commit_errors_total", "Source commits that failed.");
        describe_histogram!("pipeline_cycle_ms", "Transform plus emit time per cycle.");
        describe_counter!("sink_emitted_total", "Successful sink emits.");
        describe_counter!("sink_failures_total", "Failed sink emits.");
        describe_histogram!("sink_fan_out_ms", "Time to deliver one item to every sink.");
    });
}

pub struct Pipeline<S: IngestionSource> {
    source: S,
    chain: TransformChain,
    sinks: SinkSet,
    emit_concurrency: usize,
    state: RunnerState,
}

impl<S: IngestionSource> Pipeline<S> {
    pub fn new(source: S, chain: TransformChain, sinks: SinkSet) -> Self {
        ensure_metrics_described();
        Self {
            source,
            chain,
            sinks,
            emit_concurrency: 1,
            state: RunnerState::Idle,
        }
    }

    /// Items emitted in parallel. Usually the store pool size.
    pub fn with_emit_concurrency(mut self, n: usize) -> Self {
        self.emit_concurrency = n.max(1);
        self
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn set_state(&mut self, next: RunnerState) {
        if self.state != next {
            tracing::trace!(target: "pipeline", from = ?self.state, to = ?next, "state");
            self.state = next;
        }
    }

    /// Normalizes and enriches in arrival order, then freezes each item.
    fn transform(&mut self, records: Vec<RawRecord>) -> Vec<Arc<NewsItem>> {
        self.set_state(RunnerState::Transforming);
        records
            .into_iter()
            .map(|raw| {
                let item = self.chain.apply(self.source.normalize(raw));
                debug_assert!(item.check_invariants(), "item {} out of range", item.id);
                Arc::new(item)
            })
            .collect()
    }

    async fn emit(&mut self, items: Vec<Arc<NewsItem>>) -> Vec<FanOutReport> {
        self.set_state(RunnerState::Emitting);
        let sinks = &self.sinks;
        stream::iter(items)
            .map(|item| sinks.fan_out(item))
            .buffer_unordered(self.emit_concurrency)
            .collect()
            .await
    }

    /// Transforms and emits one batch, then commits the source.
    pub async fn process(&mut self, records: Vec<RawRecord>) -> CycleReport {
        let t0 = Instant::now();
        let mut report = CycleReport {
            fetched: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            self.set_state(RunnerState::Idle);
            return report;
        }

        let items = self.transform(records);
        counter!("pipeline_items_total").increment(items.len() as u64);

        for r in self.emit(items).await {
            if r.is_success() {
                report.emitted += 1;
            } else {
                report.failed += 1;
            }
            if !r.degraded.is_empty() {
                report.degraded += 1;
            }
        }
        counter!("pipeline_items_failed_total").increment(report.failed as u64);

        if let Err(e) = self.source.commit().await {
            tracing::warn!(target: "pipeline", source = self.source.name(), error = ?e, "commit failed; batch may be redelivered");
            counter!("pipeline_commit_errors_total").increment(1);
        }

        histogram!("pipeline_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("pipeline_cycles_total").increment(1);
        tracing::info!(
            target: "pipeline",
            source = self.source.name(),
            fetched = report.fetched,
            emitted = report.emitted,
            failed = report.failed,
            degraded = report.degraded,
            "cycle done"
        );
        self.set_state(RunnerState::Idle);
        report
    }

    /// One full cycle without shutdown handling.
    pub async fn run_cycle(&mut self) -> anyhow::Result<CycleReport> {
        self.set_state(RunnerState::Fetching);
        let records = self.source.pull().await?;
        Ok(self.process(records).await)
    }

    /// Loops until `shutdown` turns true (or its sender is dropped).
    /// Shutdown interrupts waiting for input but never an emit in flight.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        let mut summary = RunSummary::default();
        tracing::info!(target: "pipeline", source = self.source.name(), sinks = self.sinks.len(), "runner started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.set_state(RunnerState::Fetching);
            let pulled = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                res = self.source.pull() => res,
            };
            match pulled {
                Ok(records) => {
                    let report = self.process(records).await;
                    summary.cycles += 1;
                    summary.totals.absorb(&report);
                }
                Err(e) => {
                    tracing::warn!(target: "pipeline", source = self.source.name(), error = ?e, "pull failed");
                    counter!("pipeline_pull_errors_total").increment(1);
                    self.set_state(RunnerState::Idle);
                    tokio::select! {
                        biased;
                        _ = shutdown.wait_for(|stop| *stop) => break,
                        _ = tokio::time::sleep(PULL_ERROR_PAUSE) => {}
                    }
                }
            }
        }

        self.set_state(RunnerState::Draining);
        tracing::info!(target: "pipeline", "draining");
        self.source.close().await;
        self.sinks.close().await;
        self.set_state(RunnerState::Stopped);
        tracing::info!(target: "pipeline", cycles = summary.cycles, emitted = summary.totals.emitted, failed = summary.totals.failed, "runner stopped");
        summary
    }
}
