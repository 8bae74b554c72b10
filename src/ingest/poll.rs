// src/ingest/poll.rs
//! Periodic polling of a fixed provider list.

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, gauge};
use rand::Rng;
use std::time::Duration;

use super::types::{RawRecord, SourceProvider};
use super::{ensure_metrics_described, IngestionSource};

/// Interval between cycles, with jitter and backoff after fully failed cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
    pub interval: Duration,
    /// Symmetric jitter ratio in `[0, 1]`.
    pub jitter: f64,
    pub max_backoff: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration, jitter: f64, max_backoff: Duration) -> Self {
        let jitter = if jitter.is_nan() { 0.0 } else { jitter.clamp(0.0, 1.0) };
        Self {
            interval,
            jitter,
            max_backoff: max_backoff.max(interval),
        }
    }

    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, 0.0, interval)
    }

    /// `interval * 2^failures`, capped at `max_backoff`, before jitter.
    pub fn base_delay(&self, consecutive_failures: u32) -> Duration {
        let factor = 1u32 << consecutive_failures.min(16);
        self.interval
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let d = self.base_delay(consecutive_failures);
        if self.jitter <= 0.0 || d.is_zero() {
            return d;
        }
        let r: f64 = rand::rng().random_range(-self.jitter..=self.jitter);
        d.mul_f64((1.0 + r).max(0.0))
    }
}

/// Queries every provider once per cycle. The first pull runs immediately.
pub struct PollSource {
    providers: Vec<Box<dyn SourceProvider>>,
    schedule: PollSchedule,
    fetch_timeout: Duration,
    started: bool,
    consecutive_failures: u32,
}

impl PollSource {
    pub fn new(
        providers: Vec<Box<dyn SourceProvider>>,
        schedule: PollSchedule,
        fetch_timeout: Duration,
    ) -> Self {
        ensure_metrics_described();
        Self {
            providers,
            schedule,
            fetch_timeout,
            started: false,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One fetch over all providers, in list order. A failing or slow
    /// provider is skipped for this cycle only.
    pub async fn fetch_cycle(&mut self) -> Vec<RawRecord> {
        let mut out = Vec::new();
        let mut ok = 0usize;
        for p in &self.providers {
            match tokio::time::timeout(self.fetch_timeout, p.fetch_latest()).await {
                Ok(Ok(mut recs)) => {
                    ok += 1;
                    tracing::debug!(target: "ingest", provider = p.name(), n = recs.len(), "fetched");
                    out.append(&mut recs);
                }
                Ok(Err(e)) => {
                    tracing::warn!(target: "ingest", provider = p.name(), error = ?e, "provider fetch failed");
                    counter!("ingest_provider_errors_total", "provider" => p.name()).increment(1);
                }
                Err(_) => {
                    tracing::warn!(
                        target: "ingest",
                        provider = p.name(),
                        timeout_ms = self.fetch_timeout.as_millis() as u64,
                        "provider fetch timed out"
                    );
                    counter!("ingest_provider_errors_total", "provider" => p.name()).increment(1);
                }
            }
        }

        if ok == 0 && !self.providers.is_empty() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        } else {
            self.consecutive_failures = 0;
        }
        gauge!("ingest_last_fetch_ts").set(chrono::Utc::now().timestamp() as f64);
        out
    }
}

#[async_trait]
impl IngestionSource for PollSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn pull(&mut self) -> Result<Vec<RawRecord>> {
        if self.started {
            let delay = self.schedule.next_delay(self.consecutive_failures);
            tracing::trace!(target: "ingest", delay_ms = delay.as_millis() as u64, "next poll");
            tokio::time::sleep(delay).await;
        }
        self.started = true;
        Ok(self.fetch_cycle().await)
    }
}
