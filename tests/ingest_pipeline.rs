// tests/ingest_pipeline.rs
//
// Both ingestion variants driven through the runner into in-memory sinks.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::watch;

use finpocket_pipeline::ingest::providers::{PlaceholderProvider, RssProvider};
use finpocket_pipeline::ingest::types::SourceProvider;
use finpocket_pipeline::ingest::{MemoryBroker, PollSchedule, PollSource, SubscriptionSource};
use finpocket_pipeline::retry::RetryPolicy;
use finpocket_pipeline::sink::{
    BroadcastBus, BroadcastSink, MemoryBus, MemoryNewsRepository, NewsQuery, NewsRepository, SinkSet,
    StoreSink,
};
use finpocket_pipeline::transform::TransformChain;
use finpocket_pipeline::{MarketImpact, Pipeline, RunnerState, Sentiment};

const RSS: &str = include_str!("fixtures/markets_rss.xml");

fn sinks(repo: Arc<MemoryNewsRepository>, bus: Arc<MemoryBus>) -> SinkSet {
    SinkSet::new()
        .with(Arc::new(StoreSink::new(repo, RetryPolicy::immediate(3), Duration::from_secs(1))))
        .with(Arc::new(BroadcastSink::new(bus, "news", Duration::from_secs(1))))
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn poll_cycle_stores_and_broadcasts_feed_items() {
    let repo = Arc::new(MemoryNewsRepository::new());
    let bus = Arc::new(MemoryBus::default());
    let mut live = bus.subscribe("news").await.unwrap();

    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(RssProvider::from_fixture(RSS)),
        Box::new(PlaceholderProvider::cnbc()),
    ];
    let source = PollSource::new(
        providers,
        PollSchedule::fixed(Duration::from_secs(60)),
        Duration::from_secs(5),
    );
    let mut p = Pipeline::new(source, TransformChain::standard(), sinks(repo.clone(), bus.clone()))
        .with_emit_concurrency(4);

    let report = p.run_cycle().await.unwrap();
    assert_eq!(report.fetched, 4);
    assert_eq!(report.emitted, 4);
    assert_eq!(repo.len(), 4);

    let rbi = repo.get("wire-1001").unwrap();
    assert_eq!(rbi.source, "Markets Wire");
    assert_eq!(rbi.published_at, "2025-06-10T04:00:00Z");
    assert!(rbi.entities.regulators.contains("RBI"));
    assert_eq!(rbi.numbers.percentages, vec!["1.2%"]);

    let sebi = repo
        .query(&NewsQuery {
            source: Some("Markets Wire".into()),
            min_relevance: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(sebi.iter().any(|it| it.title == "SEBI tightens IPO norms"));

    let cnbc = repo
        .query(&NewsQuery {
            source: Some("CNBC".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(cnbc.len(), 1);
    assert_eq!(cnbc[0].relevance, 50);
    assert_eq!(cnbc[0].market_impact, MarketImpact::High);
    assert_eq!(cnbc[0].sentiment, Sentiment::Negative);

    let mut seen = 0;
    while seen < 4 {
        let msg = tokio::time::timeout(Duration::from_secs(1), live.next())
            .await
            .unwrap()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert!(v["id"].is_string());
        seen += 1;
    }
}

#[tokio::test]
async fn rss_repoll_overwrites_instead_of_duplicating() {
    let repo = Arc::new(MemoryNewsRepository::new());
    let bus = Arc::new(MemoryBus::default());
    let source = PollSource::new(
        vec![Box::new(RssProvider::from_fixture(RSS))],
        PollSchedule::fixed(Duration::from_millis(1)),
        Duration::from_secs(5),
    );
    let mut p = Pipeline::new(source, TransformChain::standard(), sinks(repo.clone(), bus));

    p.run_cycle().await.unwrap();
    p.run_cycle().await.unwrap();
    assert_eq!(repo.len(), 3);
}

#[tokio::test]
async fn subscription_runner_survives_bad_records_and_disconnects() {
    let broker = MemoryBroker::new();
    broker.disconnect_after(2);
    broker.push_json(&json!({"id": "k1", "source": "Kafka", "title": "Nifty gains 0.8%"}));
    broker.push("{not json");
    broker.push_json(&json!({"id": "k2", "title": "SEBI tightens IPO norms", "categories": ["stocks"]}));
    broker.push_json(&json!({"title": 17}));
    broker.push_json(&json!({"guid": "k3", "title": "RBI cuts repo rate"}));

    let repo = Arc::new(MemoryNewsRepository::new());
    let bus = Arc::new(MemoryBus::default());
    let source = SubscriptionSource::new(
        Box::new(broker.clone()),
        RetryPolicy::new(5, Duration::from_millis(5), Duration::from_millis(20)),
    );
    let mut p = Pipeline::new(source, TransformChain::standard(), sinks(repo.clone(), bus));

    let (tx, rx) = watch::channel(false);
    let runner = tokio::spawn(async move {
        let summary = p.run(rx).await;
        (summary, p.state())
    });

    let r = repo.clone();
    wait_until(move || r.len() == 3).await;
    let b = broker.clone();
    wait_until(move || b.committed() == 5).await;

    tx.send(true).unwrap();
    let (summary, state) = runner.await.unwrap();

    assert_eq!(state, RunnerState::Stopped);
    assert_eq!(summary.totals.emitted, 3);
    assert_eq!(summary.totals.failed, 0);
    assert!(broker.connects() >= 2, "session should have been reopened");
    assert_eq!(repo.get("k1").unwrap().source, "Kafka");
    assert_eq!(repo.get("k2").unwrap().relevance, 30);
    assert_eq!(repo.get("k3").unwrap().source, "unknown");
}

#[tokio::test]
async fn shutdown_before_first_message_closes_cleanly() {
    let broker = MemoryBroker::new();
    let repo = Arc::new(MemoryNewsRepository::new());
    let source = SubscriptionSource::new(Box::new(broker.clone()), RetryPolicy::immediate(1));
    let mut p = Pipeline::new(
        source,
        TransformChain::standard(),
        sinks(repo.clone(), Arc::new(MemoryBus::default())),
    );

    let (tx, rx) = watch::channel(false);
    let runner = tokio::spawn(async move {
        let summary = p.run(rx).await;
        (summary, p.state())
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(true).unwrap();

    let (summary, state) = tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, RunnerState::Stopped);
    assert_eq!(summary.cycles, 0);
    assert!(repo.is_empty());
}
