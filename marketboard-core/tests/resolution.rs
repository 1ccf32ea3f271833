//! Integration tests for tiered resolution against a scripted provider.
//!
//! Tests:
//! 1. Metadata fills every field, so history is never pulled
//! 2. 2-year history is consulted only when the 1-year window is empty
//! 3. A non-empty 1-year window stops escalation
//! 4. Upstream failures are retried; exhausted retries leave the quote empty
//! 5. Timestamps come from the snapshot's market time

use chrono::NaiveDate;
use marketboard_core::data::{DailyBar, Lookback, StaticSource};
use marketboard_core::quote::{Resolution, SourceTag, UnresolvedReason};
use marketboard_core::resolver::{Resolve, ResolverSettings, ValueResolver};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn fast_settings() -> ResolverSettings {
    ResolverSettings {
        backoff: Duration::from_millis(1),
        ..ResolverSettings::default()
    }
}

fn resolver(source: &Arc<StaticSource>) -> ValueResolver {
    ValueResolver::new(source.clone(), fast_settings())
}

/// Bars with highs and lows around `base`, closes rising by 1.
fn bars(base: f64, n: u32) -> Vec<DailyBar> {
    (0..n)
        .map(|i| {
            let date = NaiveDate::from_ymd_opt(2024, 1, 1 + i).unwrap();
            let close = base + i as f64;
            DailyBar::new(date, close + 2.0, close - 2.0, close)
        })
        .collect()
}

fn history_calls(source: &StaticSource) -> Vec<String> {
    source
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("history"))
        .collect()
}

// ──────────────────────────────────────────────
// Tier order
// ──────────────────────────────────────────────

#[test]
fn metadata_completes_quote_without_history() {
    let source = Arc::new(
        StaticSource::new()
            .with_snapshot("TCS.NS", json!({ "regularMarketPrice": 3890.5 }))
            .with_metadata(
                "TCS.NS",
                json!({
                    "regularMarketPreviousClose": "3,870.10",
                    "fiftyTwoWeekHigh": 4254.75,
                    "fiftyTwoWeekLow": 3056.05
                }),
            ),
    );

    let quote = resolver(&source).resolve("TCS.NS");

    assert_eq!(quote.price.value(), Some(3890.5));
    assert_eq!(quote.price.source(), Some(SourceTag::Snapshot));
    assert_eq!(quote.previous_price.value(), Some(3870.1));
    assert_eq!(quote.previous_price.source(), Some(SourceTag::Metadata));
    assert_eq!(quote.source_tag, "snapshot+metadata");
    assert!(history_calls(&source).is_empty());
}

#[test]
fn two_year_history_only_when_one_year_is_empty() {
    let source = Arc::new(
        StaticSource::new()
            .with_snapshot("NEWLIST.NS", json!({ "lastPrice": 101.0 }))
            .with_history("NEWLIST.NS", Lookback::OneYear, Vec::new())
            .with_history("NEWLIST.NS", Lookback::TwoYears, bars(100.0, 5)),
    );

    let quote = resolver(&source).resolve("NEWLIST.NS");

    assert_eq!(
        history_calls(&source),
        vec!["history-1y:NEWLIST.NS", "history-2y:NEWLIST.NS"]
    );
    assert_eq!(quote.price.value(), Some(101.0));
    assert_eq!(quote.year_high.value(), Some(106.0));
    assert_eq!(quote.year_low.value(), Some(98.0));
    assert_eq!(quote.previous_price.value(), Some(103.0));
    assert_eq!(quote.year_high.source(), Some(SourceTag::History2y));
}

#[test]
fn one_year_history_stops_escalation() {
    let source = Arc::new(
        StaticSource::new()
            .with_history("^NSEI", Lookback::OneYear, bars(22000.0, 3))
            .with_history("^NSEI", Lookback::TwoYears, bars(1.0, 3)),
    );

    let quote = resolver(&source).resolve("^NSEI");

    assert_eq!(history_calls(&source), vec!["history-1y:^NSEI"]);
    assert_eq!(quote.price.value(), Some(22002.0));
    assert_eq!(quote.previous_price.value(), Some(22001.0));
    assert_eq!(quote.source_tag, "history-1y");
    assert_eq!(quote.timestamp.as_deref(), Some("2024-01-03"));
}

#[test]
fn nothing_anywhere_is_missing_not_an_error() {
    let source = Arc::new(StaticSource::new());
    let quote = resolver(&source).resolve("DELISTED");
    assert!(quote.is_empty());
    assert_eq!(quote.price, Resolution::Unresolved(UnresolvedReason::Missing));
    assert_eq!(quote.source_tag, "none");
    assert_eq!(source.attempts("DELISTED"), 1);
}

// ──────────────────────────────────────────────
// Retries
// ──────────────────────────────────────────────

#[test]
fn recovers_on_third_attempt() {
    let source = Arc::new(
        StaticSource::new()
            .with_snapshot("BTC-USD", json!({ "lastPrice": 67000.0, "previousClose": 66000.0 }))
            .failing_attempts("BTC-USD", 2),
    );

    let quote = resolver(&source).resolve("BTC-USD");

    assert_eq!(source.attempts("BTC-USD"), 3);
    assert_eq!(quote.price.value(), Some(67000.0));
    assert_eq!(quote.change(), Some(1000.0));
}

#[test]
fn exhausted_retries_leave_quote_empty() {
    let source = Arc::new(
        StaticSource::new()
            .with_snapshot("BZ=F", json!({ "lastPrice": 82.0 }))
            .failing_attempts("BZ=F", 5),
    );

    let quote = resolver(&source).resolve("BZ=F");

    assert_eq!(source.attempts("BZ=F"), 3);
    assert!(quote.is_empty());
    assert_eq!(
        quote.year_low,
        Resolution::Unresolved(UnresolvedReason::RetriesExhausted)
    );
}

#[test]
fn snapshot_market_time_in_local_offset() {
    // 2024-03-11 04:00:00 UTC is 09:30 IST.
    let source = Arc::new(StaticSource::new().with_snapshot(
        "^BSESN",
        json!({ "regularMarketPrice": 73500.0, "regularMarketTime": 1710129600 }),
    ));
    let quote = resolver(&source).resolve("^BSESN");
    assert_eq!(quote.timestamp.as_deref(), Some("09:30"));
}
