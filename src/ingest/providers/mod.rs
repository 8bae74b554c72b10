// src/ingest/providers/mod.rs
pub mod placeholder;
pub mod rss;

pub use placeholder::PlaceholderProvider;
pub use rss::RssProvider;

use crate::ingest::types::SourceProvider;

/// Builds the provider list from config names. Unknown names are skipped
/// with a warning; `rss:<url>` entries become HTTP feeds.
pub fn from_names(names: &[String], fetch_timeout: std::time::Duration) -> Vec<Box<dyn SourceProvider>> {
    let mut out: Vec<Box<dyn SourceProvider>> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "bloomberg" => out.push(Box::new(PlaceholderProvider::bloomberg())),
            "cnbc" => out.push(Box::new(PlaceholderProvider::cnbc())),
            _ => {
                if let Some(url) = name.strip_prefix("rss:") {
                    out.push(Box::new(RssProvider::from_url(url, fetch_timeout)));
                } else {
                    tracing::warn!(target: "ingest", provider = name, "unknown provider; skipped");
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn builds_known_providers() {
        let names = vec![
            "Bloomberg".to_string(),
            "cnbc".to_string(),
            "rss:https://example.com/feed.xml".to_string(),
            "nope".to_string(),
        ];
        let ps = from_names(&names, Duration::from_secs(5));
        let got: Vec<_> = ps.iter().map(|p| p.name()).collect();
        assert_eq!(got, vec!["Bloomberg", "CNBC", "RSS"]);
    }
}
