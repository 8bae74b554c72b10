// src/app.rs
//! Wiring: builds shared resources from config and runs the chosen source.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::ApiState;
use crate::config::{BusBackend, PipelineConfig, SourceKind, StoreBackend};
use crate::ingest::{providers, PollSchedule, PollSource};
use crate::pipeline::{Pipeline, RunSummary};
use crate::sink::{
    BroadcastBus, BroadcastSink, MemoryBus, MemoryNewsRepository, NewsRepository, PgNewsRepository,
    RedisBus, SinkSet, StoreSink,
};
use crate::transform::TransformChain;

/// Process-wide handles shared by the sinks and the API.
#[derive(Clone)]
pub struct Resources {
    pub repo: Arc<dyn NewsRepository>,
    pub bus: Arc<dyn BroadcastBus>,
}

impl Resources {
    /// Nothing connects here; Postgres and Redis connect on first use.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let repo: Arc<dyn NewsRepository> = match cfg.store.backend {
            StoreBackend::Postgres => Arc::new(PgNewsRepository::connect_lazy(
                &cfg.store.url,
                cfg.store.pool_size,
                cfg.store.attempt_timeout(),
            )?),
            StoreBackend::Memory => Arc::new(MemoryNewsRepository::new()),
        };
        let bus: Arc<dyn BroadcastBus> = match cfg.broadcast.backend {
            BusBackend::Redis => Arc::new(RedisBus::new(&cfg.broadcast.url)?),
            BusBackend::Memory => Arc::new(MemoryBus::default()),
        };
        tracing::info!(
            target: "pipeline",
            store = ?cfg.store.backend,
            bus = ?cfg.broadcast.backend,
            channel = %cfg.broadcast.channel,
            "resources ready"
        );
        Ok(Self { repo, bus })
    }

    pub fn sinks(&self, cfg: &PipelineConfig) -> SinkSet {
        SinkSet::new()
            .with(Arc::new(StoreSink::new(
                Arc::clone(&self.repo),
                cfg.store.retry.clone(),
                cfg.store.attempt_timeout(),
            )))
            .with(Arc::new(BroadcastSink::new(
                Arc::clone(&self.bus),
                cfg.broadcast.channel.clone(),
                cfg.broadcast.publish_timeout(),
            )))
    }

    pub fn api_state(&self, cfg: &PipelineConfig) -> ApiState {
        ApiState {
            repo: Arc::clone(&self.repo),
            bus: Arc::clone(&self.bus),
            channel: cfg.broadcast.channel.clone(),
            api_key: cfg.api.api_key.clone(),
        }
    }

    /// Closes the store pool. Call after the runner and the API have both stopped.
    pub async fn close(&self) {
        self.repo.close().await;
        tracing::debug!(target: "pipeline", "resources closed");
    }
}

/// Runs the configured source until `shutdown` fires.
pub async fn run_pipeline(
    cfg: &PipelineConfig,
    res: &Resources,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    let chain = TransformChain::standard();
    let sinks = res.sinks(cfg);
    let concurrency = cfg.store.pool_size as usize;

    match cfg.source.resolved_kind() {
        SourceKind::Poll => {
            let list = providers::from_names(&cfg.source.providers, cfg.source.fetch_timeout());
            if list.is_empty() {
                anyhow::bail!("poll source has no usable providers");
            }
            let schedule = PollSchedule::new(
                cfg.source.interval(),
                cfg.source.jitter,
                cfg.source.max_backoff(),
            );
            let source = PollSource::new(list, schedule, cfg.source.fetch_timeout());
            let mut p = Pipeline::new(source, chain, sinks).with_emit_concurrency(concurrency);
            Ok(p.run(shutdown).await)
        }
        SourceKind::Subscription => run_subscription(cfg, chain, sinks, concurrency, shutdown).await,
    }
}

#[cfg(feature = "kafka")]
async fn run_subscription(
    cfg: &PipelineConfig,
    chain: TransformChain,
    sinks: SinkSet,
    concurrency: usize,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    use crate::ingest::kafka::KafkaConnector;
    use crate::ingest::SubscriptionSource;
    use anyhow::Context;

    let brokers = cfg
        .source
        .brokers
        .clone()
        .context("subscription source needs brokers")?;
    let connector = KafkaConnector::new(brokers, cfg.source.topic.clone(), cfg.source.group_id.clone());
    let source = SubscriptionSource::new(Box::new(connector), cfg.source.reconnect.clone());
    let mut p = Pipeline::new(source, chain, sinks).with_emit_concurrency(concurrency);
    Ok(p.run(shutdown).await)
}

#[cfg(not(feature = "kafka"))]
async fn run_subscription(
    _cfg: &PipelineConfig,
    _chain: TransformChain,
    _sinks: SinkSet,
    _concurrency: usize,
    _shutdown: watch::Receiver<bool>,
) -> Result<RunSummary> {
    anyhow::bail!("brokers configured but this build lacks the `kafka` feature")
}
