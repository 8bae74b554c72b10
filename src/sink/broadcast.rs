// src/sink/broadcast.rs
//! Best-effort live broadcast of finished items over a named pub/sub channel.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};

use super::{Delivery, Sink};
use crate::error::{BusError, SinkError};
use crate::model::NewsItem;

/// Pub/sub transport shared by the broadcaster and the live relay.
#[async_trait]
pub trait BroadcastBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError>;
    /// Stream of payloads published on `channel` from now on.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BusError>;
}

/// Redis pub/sub. The publish connection is opened on first use and reused;
/// every subscriber gets its own connection.
pub struct RedisBus {
    client: redis::Client,
    publisher: OnceCell<ConnectionManager>,
}

impl RedisBus {
    pub fn new(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            publisher: OnceCell::new(),
        })
    }

    async fn publisher(&self) -> Result<ConnectionManager, BusError> {
        let conn = self
            .publisher
            .get_or_try_init(|| async {
                let conn = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|e| BusError::Connect(e.to_string()))?;
                tracing::info!(target: "sink", "redis publish connection established");
                Ok::<_, BusError>(conn)
            })
            .await?;
        // ConnectionManager is a cheap handle over one multiplexed connection.
        Ok(conn.clone())
    }
}

#[async_trait]
impl BroadcastBus for RedisBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.publisher().await?;
        let _receivers: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() });
        Ok(messages.boxed())
    }
}

/// In-process bus over tokio broadcast channels.
pub struct MemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, channel: &str) -> Result<broadcast::Sender<String>, BusError> {
        let mut map = self
            .channels
            .lock()
            .map_err(|_| BusError::Publish("bus mutex poisoned".into()))?;
        Ok(map
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone())
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl BroadcastBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        // No subscribers is not an error for pub/sub.
        let _ = self.sender(channel)?.send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BusError> {
        let rx = self.sender(channel)?.subscribe();
        let s = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => return Some((msg, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "sink", skipped, "memory bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(s.boxed())
    }
}

/// Publishes the full item as JSON. One attempt, bounded by a timeout.
pub struct BroadcastSink {
    bus: Arc<dyn BroadcastBus>,
    channel: String,
    publish_timeout: Duration,
}

impl BroadcastSink {
    pub fn new(bus: Arc<dyn BroadcastBus>, channel: impl Into<String>, publish_timeout: Duration) -> Self {
        Self {
            bus,
            channel: channel.into(),
            publish_timeout,
        }
    }
}

#[async_trait]
impl Sink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn delivery(&self) -> Delivery {
        Delivery::BestEffort
    }

    async fn emit(&self, item: &NewsItem) -> Result<(), SinkError> {
        let payload = serde_json::to_string(item)?;
        match tokio::time::timeout(self.publish_timeout, self.bus.publish(&self.channel, payload)).await {
            Ok(res) => res?,
            Err(_) => return Err(BusError::Timeout(self.publish_timeout.as_millis() as u64).into()),
        }
        tracing::debug!(target: "sink", item_id = %item.id, channel = %self.channel, "published");
        Ok(())
    }
}
