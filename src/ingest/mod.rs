// src/ingest/mod.rs
pub mod poll;
pub mod providers;
pub mod subscription;
pub mod types;

#[cfg(feature = "kafka")]
pub mod kafka;

use crate::ingest::types::RawRecord;
use crate::model::NewsItem;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use rand::Rng;

pub use poll::{PollSchedule, PollSource};
pub use subscription::{BrokerConnector, BrokerConsumer, BrokerMessage, MemoryBroker, SubscriptionSource};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Raw records fetched from providers or the broker.");
        describe_counter!(
            "ingest_dropped_total",
            "Raw records dropped because they could not be decoded."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_counter!("ingest_reconnects_total", "Broker reconnect attempts.");
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!(
            "ingest_last_fetch_ts",
            "Unix ts of the last completed fetch."
        );
    });
}

/// Where items come from. `pull` owns the variant's scheduling: the poll
/// source sleeps until its next tick, the subscription source waits for
/// the next broker message.
#[async_trait::async_trait]
pub trait IngestionSource: Send {
    fn name(&self) -> &'static str;

    async fn pull(&mut self) -> anyhow::Result<Vec<RawRecord>>;

    fn normalize(&self, raw: RawRecord) -> NewsItem {
        normalize_record(raw)
    }

    /// Acknowledge everything returned by previous pulls.
    async fn commit(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&mut self) {}
}

/// Random 16-hex-char id for records that arrive without one.
pub fn generate_id() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

/// Applies the defaulting rules and baseline enrichment values.
pub fn normalize_record(raw: RawRecord) -> NewsItem {
    let id = non_empty(raw.id)
        .or_else(|| non_empty(raw.guid))
        .unwrap_or_else(generate_id);
    let source = non_empty(raw.source).unwrap_or_else(|| "unknown".to_string());

    let mut item = NewsItem::new(id, source, raw.title.unwrap_or_default())
        .with_url(raw.url.unwrap_or_default())
        .with_published_at(raw.published_at.unwrap_or_default())
        .with_categories(raw.categories.unwrap_or_default());
    item.summary = raw.summary;
    item.content = raw.content;
    item
}

/// Decodes a broker payload. Only JSON objects are accepted; a field with
/// the wrong type rejects the whole record.
pub fn decode_record(payload: &[u8]) -> anyhow::Result<RawRecord> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    if !value.is_object() {
        anyhow::bail!("record is not a JSON object");
    }
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn record_dropped(source: &'static str, reason: &dyn std::fmt::Display) {
    tracing::warn!(target: "ingest", source, error = %reason, "dropping malformed record");
    counter!("ingest_dropped_total", "source" => source).increment(1);
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}
