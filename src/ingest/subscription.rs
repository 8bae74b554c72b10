// src/ingest/subscription.rs
//! Continuous broker subscription with reconnect and at-least-once commits.

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use super::types::RawRecord;
use super::{decode_record, ensure_metrics_described, record_dropped, IngestionSource};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// Opens consumer sessions against a broker topic.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerConsumer>>;
    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// One live consumer session.
#[async_trait]
pub trait BrokerConsumer: Send {
    /// Next message. `None` means the session is gone and must be reopened.
    async fn recv(&mut self) -> Option<BrokerMessage>;
    /// Commit everything received so far.
    async fn commit(&mut self) -> Result<()>;
    async fn close(&mut self) {}
}

/// Yields one record per pull. Disconnects are handled here by reopening
/// the session with backoff; the caller never sees them.
pub struct SubscriptionSource {
    connector: Box<dyn BrokerConnector>,
    consumer: Option<Box<dyn BrokerConsumer>>,
    reconnect: RetryPolicy,
    reconnect_attempt: u32,
    pending_commit: bool,
}

impl SubscriptionSource {
    pub fn new(connector: Box<dyn BrokerConnector>, reconnect: RetryPolicy) -> Self {
        ensure_metrics_described();
        Self {
            connector,
            consumer: None,
            reconnect: reconnect.sanitized(),
            reconnect_attempt: 0,
            pending_commit: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.consumer.is_some()
    }

    async fn ensure_connected(&mut self) {
        while self.consumer.is_none() {
            if self.reconnect_attempt > 0 {
                let delay = self.reconnect.delay_for(self.reconnect_attempt);
                tracing::info!(
                    target: "ingest",
                    attempt = self.reconnect_attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting to broker"
                );
                counter!("ingest_reconnects_total").increment(1);
                tokio::time::sleep(delay).await;
            }
            match self.connector.connect().await {
                Ok(c) => {
                    tracing::info!(target: "ingest", broker = %self.connector.describe(), "broker session open");
                    self.consumer = Some(c);
                    self.reconnect_attempt = 0;
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", broker = %self.connector.describe(), error = ?e, "broker connect failed");
                    self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
                }
            }
        }
    }
}

#[async_trait]
impl IngestionSource for SubscriptionSource {
    fn name(&self) -> &'static str {
        "subscription"
    }

    async fn pull(&mut self) -> Result<Vec<RawRecord>> {
        loop {
            self.ensure_connected().await;
            let Some(consumer) = self.consumer.as_mut() else {
                continue;
            };
            let msg = consumer.recv().await;
            match msg {
                Some(m) => {
                    self.pending_commit = true;
                    match decode_record(&m.payload) {
                        Ok(raw) => {
                            counter!("ingest_events_total", "source" => "subscription").increment(1);
                            return Ok(vec![raw]);
                        }
                        Err(e) => {
                            tracing::debug!(target: "ingest", partition = m.partition, offset = m.offset, "undecodable payload");
                            record_dropped("subscription", &e);
                        }
                    }
                }
                None => {
                    tracing::warn!(target: "ingest", broker = %self.connector.describe(), "broker session lost");
                    if let Some(mut c) = self.consumer.take() {
                        c.close().await;
                    }
                    // Uncommitted messages are redelivered on the new session.
                    self.pending_commit = false;
                    self.reconnect_attempt = 1;
                }
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.pending_commit {
            return Ok(());
        }
        if let Some(c) = self.consumer.as_mut() {
            c.commit().await?;
            self.pending_commit = false;
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut c) = self.consumer.take() {
            c.close().await;
        }
    }
}

#[derive(Default)]
struct BrokerState {
    log: Vec<Vec<u8>>,
    committed: usize,
    connects: u32,
    fail_connects: u32,
    disconnect_after: Option<usize>,
}

#[derive(Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// In-process single-partition broker. Consumers resume from the last
/// committed offset, like a consumer group.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, payload: impl Into<Vec<u8>>) {
        self.state().log.push(payload.into());
        self.inner.notify.notify_one();
    }

    pub fn push_json(&self, value: &serde_json::Value) {
        self.push(value.to_string());
    }

    /// The next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.state().fail_connects = n;
    }

    /// The next session ends after delivering `n` messages.
    pub fn disconnect_after(&self, n: usize) {
        self.state().disconnect_after = Some(n);
    }

    /// Offset of the first uncommitted message.
    pub fn committed(&self) -> usize {
        self.state().committed
    }

    pub fn connects(&self) -> u32 {
        self.state().connects
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerConsumer>> {
        let mut st = self.state();
        st.connects += 1;
        if st.fail_connects > 0 {
            st.fail_connects -= 1;
            anyhow::bail!("broker unavailable");
        }
        Ok(Box::new(MemoryConsumer {
            broker: self.clone(),
            position: st.committed,
            delivered: 0,
            disconnect_after: st.disconnect_after.take(),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryConsumer {
    broker: MemoryBroker,
    position: usize,
    delivered: usize,
    disconnect_after: Option<usize>,
}

#[async_trait]
impl BrokerConsumer for MemoryConsumer {
    async fn recv(&mut self) -> Option<BrokerMessage> {
        loop {
            if self.disconnect_after.is_some_and(|n| self.delivered >= n) {
                return None;
            }
            {
                let st = self.broker.state();
                if let Some(payload) = st.log.get(self.position) {
                    let msg = BrokerMessage {
                        payload: payload.clone(),
                        partition: 0,
                        offset: self.position as i64,
                    };
                    self.position += 1;
                    self.delivered += 1;
                    return Some(msg);
                }
            }
            self.broker.inner.notify.notified().await;
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let mut st = self.broker.state();
        st.committed = st.committed.max(self.position);
        Ok(())
    }
}
