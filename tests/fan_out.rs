// tests/fan_out.rs
//
// Sink isolation, retries and idempotent upserts through the public sink API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use finpocket_pipeline::error::{BusError, SinkError, StoreError};
use finpocket_pipeline::retry::RetryPolicy;
use finpocket_pipeline::sink::{
    BroadcastBus, BroadcastSink, MemoryNewsRepository, NewsQuery, NewsRepository, SinkSet, StoreSink,
};
use finpocket_pipeline::NewsItem;

/// Bus that refuses every publish and counts the attempts.
#[derive(Default)]
struct DeadBus {
    publishes: AtomicU32,
}

#[async_trait]
impl BroadcastBus for DeadBus {
    async fn publish(&self, _channel: &str, _payload: String) -> Result<(), BusError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Err(BusError::Publish("connection refused".into()))
    }
    async fn subscribe(&self, _channel: &str) -> Result<BoxStream<'static, String>, BusError> {
        Err(BusError::Subscribe("down".into()))
    }
}

/// Bus whose publish never completes.
struct HungBus;

#[async_trait]
impl BroadcastBus for HungBus {
    async fn publish(&self, _channel: &str, _payload: String) -> Result<(), BusError> {
        std::future::pending().await
    }
    async fn subscribe(&self, _channel: &str) -> Result<BoxStream<'static, String>, BusError> {
        Err(BusError::Subscribe("hung".into()))
    }
}

/// Repository that fails transiently `n` times before delegating.
struct Flaky {
    remaining: AtomicU32,
    calls: AtomicU32,
    inner: MemoryNewsRepository,
}

impl Flaky {
    fn new(failures: u32) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            inner: MemoryNewsRepository::new(),
        }
    }
}

#[async_trait]
impl NewsRepository for Flaky {
    async fn upsert(&self, item: &NewsItem) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.remaining.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Transient("connection reset".into()));
        }
        self.inner.upsert(item).await
    }
    async fn query(&self, q: &NewsQuery) -> Result<Vec<NewsItem>, StoreError> {
        self.inner.query(q).await
    }
}

fn store_sink(repo: Arc<dyn NewsRepository>, attempts: u32) -> Arc<StoreSink> {
    Arc::new(StoreSink::new(repo, RetryPolicy::immediate(attempts), Duration::from_secs(1)))
}

#[tokio::test]
async fn dead_broadcaster_does_not_block_store() {
    let repo = Arc::new(MemoryNewsRepository::new());
    let bus = Arc::new(DeadBus::default());
    let sinks = SinkSet::new()
        .with(store_sink(repo.clone(), 3))
        .with(Arc::new(BroadcastSink::new(bus.clone(), "news", Duration::from_secs(1))));

    let report = sinks.fan_out(Arc::new(NewsItem::new("n1", "CNBC", "hello"))).await;

    assert!(report.is_success());
    assert_eq!(report.degraded, vec!["broadcast"]);
    assert!(repo.get("n1").is_some());
    assert_eq!(bus.publishes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_broadcaster_is_cut_off_at_publish_timeout() {
    let repo = Arc::new(MemoryNewsRepository::new());
    let sinks = SinkSet::new()
        .with(store_sink(repo.clone(), 1))
        .with(Arc::new(BroadcastSink::new(Arc::new(HungBus), "news", Duration::from_millis(200))));

    let t0 = tokio::time::Instant::now();
    let report = sinks.fan_out(Arc::new(NewsItem::new("n1", "CNBC", "hello"))).await;
    let elapsed = t0.elapsed();

    assert!(report.is_success());
    assert_eq!(report.degraded, vec!["broadcast"]);
    assert!(elapsed >= Duration::from_millis(200), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "waited past the timeout: {elapsed:?}");
    assert!(repo.get("n1").is_some());
}

#[tokio::test]
async fn store_recovers_after_two_transient_failures() {
    let repo = Arc::new(Flaky::new(2));
    let sinks = SinkSet::new().with(store_sink(repo.clone(), 5));

    let report = sinks.fan_out(Arc::new(NewsItem::new("n1", "CNBC", "hello"))).await;

    assert!(report.is_success());
    assert_eq!(repo.calls.load(Ordering::SeqCst), 3);
    assert_eq!(repo.query(&NewsQuery::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn store_gives_up_at_the_ceiling() {
    let repo = Arc::new(Flaky::new(10));
    let sink = store_sink(repo.clone(), 3);

    let err = finpocket_pipeline::sink::Sink::emit(sink.as_ref(), &NewsItem::new("n1", "s", "t"))
        .await
        .unwrap_err();

    assert!(matches!(err, SinkError::StoreExhausted { attempts: 3, .. }));
    assert_eq!(repo.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn same_id_twice_keeps_one_row_equal_to_the_second() {
    let repo = Arc::new(MemoryNewsRepository::new());
    let sinks = SinkSet::new().with(store_sink(repo.clone(), 1));

    let first = NewsItem::new("dup", "CNBC", "first").with_summary("a");
    let mut second = NewsItem::new("dup", "Bloomberg", "second");
    second.relevance = 40;

    sinks.fan_out(Arc::new(first)).await;
    sinks.fan_out(Arc::new(second.clone())).await;

    assert_eq!(repo.len(), 1);
    assert_eq!(repo.get("dup"), Some(second));
}

#[tokio::test]
async fn failing_store_marks_item_failed() {
    let repo = Arc::new(Flaky::new(u32::MAX));
    let sinks = SinkSet::new().with(store_sink(repo, 2));
    let report = sinks.fan_out(Arc::new(NewsItem::new("x", "s", "t"))).await;
    assert!(!report.is_success());
    assert_eq!(report.failed[0].0, "store");
}
