// tests/enrichment.rs
//
// End-to-end behaviour of the transform chain on realistic headlines.

use std::collections::BTreeSet;

use finpocket_pipeline::ingest::{normalize_record, types::RawRecord};
use finpocket_pipeline::transform::TransformChain;
use finpocket_pipeline::{MarketImpact, NewsItem};

fn enrich(title: &str) -> NewsItem {
    TransformChain::standard().apply(NewsItem::new("t", "test", title))
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn rbi_sensex_headline_extracts_entities_and_numbers() {
    let out = enrich("RBI holds rates as Sensex rises 1.2%");
    assert_eq!(out.entities.regulators, set(&["RBI"]));
    assert_eq!(out.entities.indices, set(&["Sensex"]));
    assert!(out.entities.companies.is_empty());
    assert_eq!(out.numbers.percentages, vec!["1.2%"]);
}

#[test]
fn three_heavy_keywords_make_high_impact() {
    let out = enrich("rbi policy: sensex and nifty react");
    assert_eq!(out.relevance, 70);
    assert_eq!(out.market_impact, MarketImpact::High);
}

#[test]
fn category_fallback_keeps_source_categories() {
    let item = NewsItem::new("t", "test", "Monsoon arrives early in Kerala").with_categories(["markets"]);
    let out = TransformChain::standard().apply(item);
    assert_eq!(out.categories, set(&["markets"]));
}

#[test]
fn keyword_hits_replace_source_categories() {
    let item = NewsItem::new("t", "test", "Bitcoin rallies past resistance").with_categories(["markets"]);
    let out = TransformChain::standard().apply(item);
    assert_eq!(out.categories, set(&["crypto"]));
}

#[test]
fn invariants_hold_for_varied_input() {
    let texts = [
        "",
        "RBI SEBI Sensex Nifty Bank Nifty rate hike inflation GDP earnings merger IPO FII DII USD Brent",
        "Infosys and TCS shares plunge 4.5% after weak guidance; Nifty IT down 320 points",
        "not bad at all, but markets are very weak",
        "₹1,200 crore deal: Reliance Industries buys stake for $150 million",
        "🚀🚀🚀",
    ];
    for t in texts {
        let out = TransformChain::standard().apply(normalize_record(RawRecord {
            title: Some(t.to_string()),
            ..Default::default()
        }));
        assert!(out.check_invariants(), "out of range for {t:?}");
        assert!(out.relevance <= 100);
        assert!((0.0..=1.0).contains(&out.sentiment_confidence));

        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["entities"].as_object().unwrap().len(), 3);
        assert_eq!(v["numbers"].as_object().unwrap().len(), 3);
    }
}

#[test]
fn relevance_is_clamped_at_100() {
    let out = enrich("RBI SEBI Sensex Nifty Bank Nifty rate hike inflation GDP earnings merger IPO");
    assert_eq!(out.relevance, 100);
}
