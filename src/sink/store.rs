// src/sink/store.rs
//! Durable, idempotent store sink.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{Delivery, Sink};
use crate::error::{SinkError, StoreError};
use crate::model::NewsItem;
use crate::retry::RetryPolicy;

/// Hard cap on rows returned by a read query.
pub const QUERY_LIMIT: usize = 200;

/// Filters accepted by the read API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewsQuery {
    pub category: Option<String>,
    pub source: Option<String>,
    pub min_relevance: Option<u8>,
}

impl NewsQuery {
    pub fn matches(&self, item: &NewsItem) -> bool {
        self.category
            .as_ref()
            .map_or(true, |c| item.categories.contains(c))
            && self.source.as_ref().map_or(true, |s| &item.source == s)
            && self.min_relevance.map_or(true, |m| item.relevance >= m)
    }
}

/// Storage backend keyed by item id.
#[async_trait]
pub trait NewsRepository: Send + Sync {
    /// Insert or fully overwrite the row with `item.id` (last write wins).
    async fn upsert(&self, item: &NewsItem) -> Result<(), StoreError>;
    /// At most [`QUERY_LIMIT`] items, newest `published_at` first.
    async fn query(&self, q: &NewsQuery) -> Result<Vec<NewsItem>, StoreError>;
    /// Release connections. The repository is shared with the API, so only
    /// its owner calls this, after everything using it has stopped.
    async fn close(&self) {}
}

/// Wraps a repository with a per-attempt timeout and the retry policy.
pub struct StoreSink {
    repo: Arc<dyn NewsRepository>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl StoreSink {
    pub fn new(repo: Arc<dyn NewsRepository>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            repo,
            policy: policy.sanitized(),
            attempt_timeout,
        }
    }

    async fn upsert_once(&self, item: &NewsItem) -> Result<(), StoreError> {
        match tokio::time::timeout(self.attempt_timeout, self.repo.upsert(item)).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout(self.attempt_timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl Sink for StoreSink {
    fn name(&self) -> &'static str {
        "store"
    }

    fn delivery(&self) -> Delivery {
        Delivery::Required
    }

    async fn emit(&self, item: &NewsItem) -> Result<(), SinkError> {
        self.policy
            .run("store.upsert", move |_attempt| self.upsert_once(item))
            .await?;
        tracing::debug!(target: "sink", item_id = %item.id, "stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::memory::MemoryNewsRepository;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Slow;

    #[async_trait]
    impl NewsRepository for Slow {
        async fn upsert(&self, _item: &NewsItem) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        async fn query(&self, _q: &NewsQuery) -> Result<Vec<NewsItem>, StoreError> {
            Ok(vec![])
        }
    }

    struct Rejecting(AtomicU32);

    #[async_trait]
    impl NewsRepository for Rejecting {
        async fn upsert(&self, _item: &NewsItem) -> Result<(), StoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Permanent("column does not exist".into()))
        }
        async fn query(&self, _q: &NewsQuery) -> Result<Vec<NewsItem>, StoreError> {
            Ok(vec![])
        }
    }

    /// Counts `close` calls.
    #[derive(Default)]
    struct Shared(AtomicU32);

    #[async_trait]
    impl NewsRepository for Shared {
        async fn upsert(&self, _item: &NewsItem) -> Result<(), StoreError> {
            Ok(())
        }
        async fn query(&self, _q: &NewsQuery) -> Result<Vec<NewsItem>, StoreError> {
            Ok(vec![])
        }
        async fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn closing_the_sink_leaves_the_repository_open() {
        let repo = Arc::new(Shared::default());
        let sinks = crate::sink::SinkSet::new().with(Arc::new(StoreSink::new(
            repo.clone(),
            RetryPolicy::immediate(1),
            Duration::from_secs(1),
        )));
        sinks.close().await;
        assert_eq!(repo.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_time_out_and_exhaust() {
        let sink = StoreSink::new(
            Arc::new(Slow),
            RetryPolicy::immediate(2),
            Duration::from_millis(50),
        );
        let err = sink.emit(&NewsItem::new("a", "s", "t")).await.unwrap_err();
        assert!(matches!(
            err,
            SinkError::StoreExhausted {
                attempts: 2,
                source: StoreError::Timeout(50)
            }
        ));
    }

    #[tokio::test]
    async fn permanent_errors_skip_retries() {
        let repo = Arc::new(Rejecting(AtomicU32::new(0)));
        let sink = StoreSink::new(repo.clone(), RetryPolicy::immediate(5), Duration::from_secs(1));
        let err = sink.emit(&NewsItem::new("a", "s", "t")).await.unwrap_err();
        assert!(matches!(err, SinkError::StoreRejected(_)));
        assert_eq!(repo.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn emit_writes_through() {
        let repo = Arc::new(MemoryNewsRepository::new());
        let sink = StoreSink::new(repo.clone(), RetryPolicy::immediate(3), Duration::from_secs(1));
        sink.emit(&NewsItem::new("a", "s", "t")).await.unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn query_filters() {
        let mut it = NewsItem::new("a", "CNBC", "t").with_categories(["markets"]);
        it.relevance = 60;
        assert!(NewsQuery::default().matches(&it));
        assert!(NewsQuery {
            category: Some("markets".into()),
            source: Some("CNBC".into()),
            min_relevance: Some(60),
        }
        .matches(&it));
        assert!(!NewsQuery {
            min_relevance: Some(61),
            ..Default::default()
        }
        .matches(&it));
        assert!(!NewsQuery {
            category: Some("crypto".into()),
            ..Default::default()
        }
        .matches(&it));
    }
}
