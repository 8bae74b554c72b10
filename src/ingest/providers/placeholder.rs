// src/ingest/providers/placeholder.rs
//! Stand-ins for licensed feeds. Each fetch yields one fixed headline
//! stamped with the current time, so every poll produces a new id.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use metrics::counter;

use crate::ingest::types::{RawRecord, SourceProvider};

#[derive(Debug, Clone)]
pub struct PlaceholderProvider {
    name: &'static str,
    id_prefix: &'static str,
    url: &'static str,
    title: &'static str,
    summary: &'static str,
}

impl PlaceholderProvider {
    pub fn bloomberg() -> Self {
        Self {
            name: "Bloomberg",
            id_prefix: "bbg",
            url: "https://www.bloomberg.com/",
            title: "Markets steady as RBI reviews rates",
            summary: "RBI maintains status quo; markets watch inflation trajectory.",
        }
    }

    pub fn cnbc() -> Self {
        Self {
            name: "CNBC",
            id_prefix: "cnbc",
            url: "https://www.cnbc.com/",
            title: "Sensex, Nifty dip on profit booking",
            summary: "Indian equities see mild correction amid global cues.",
        }
    }

    fn record_at(&self, now: &str) -> RawRecord {
        RawRecord {
            id: Some(format!("{}-{}", self.id_prefix, now)),
            source: Some(self.name.to_string()),
            title: Some(self.title.to_string()),
            url: Some(self.url.to_string()),
            published_at: Some(now.to_string()),
            summary: Some(self.summary.to_string()),
            categories: Some(Vec::new()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceProvider for PlaceholderProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawRecord>> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        counter!("ingest_events_total", "source" => self.name).increment(1);
        Ok(vec![self.record_at(&now)])
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
