// src/ingest/kafka.rs
//! Kafka consumer sessions over rdkafka's `StreamConsumer`.
//!
//! Auto-commit is off: offsets are committed only after the pipeline has
//! emitted what it pulled.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::ClientConfig;

use super::subscription::{BrokerConnector, BrokerConsumer, BrokerMessage};

#[derive(Debug, Clone)]
pub struct KafkaConnector {
    brokers: String,
    topic: String,
    group_id: String,
}

impl KafkaConnector {
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            group_id: group_id.into(),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "10000");
        cfg
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerConsumer>> {
        let consumer: StreamConsumer = self
            .client_config()
            .create()
            .context("creating kafka consumer")?;
        consumer
            .subscribe(&[self.topic.as_str()])
            .with_context(|| format!("subscribing to {}", self.topic))?;
        Ok(Box::new(KafkaConsumer { consumer }))
    }

    fn describe(&self) -> String {
        format!("kafka://{}/{}", self.brokers, self.topic)
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl BrokerConsumer for KafkaConsumer {
    async fn recv(&mut self) -> Option<BrokerMessage> {
        match self.consumer.recv().await {
            Ok(msg) => Some(BrokerMessage {
                payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                partition: msg.partition(),
                offset: msg.offset(),
            }),
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "kafka consumer error");
                None
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.consumer
            .commit_consumer_state(CommitMode::Async)
            .context("committing kafka offsets")
    }

    async fn close(&mut self) {
        self.consumer.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_target() {
        let c = KafkaConnector::new("localhost:9092", "news", "pipeline");
        assert_eq!(c.describe(), "kafka://localhost:9092/news");
        let cfg = c.client_config();
        assert_eq!(cfg.get("enable.auto.commit"), Some("false"));
        assert_eq!(cfg.get("group.id"), Some("pipeline"));
    }
}
