//! Dispatcher timeouts: a stalled ticker must not hold up its siblings.

use marketboard_core::data::StaticSource;
use marketboard_core::dispatch::{dispatch, DispatchSettings, SilentProgress};
use marketboard_core::quote::{Resolution, ResolvedQuote, UnresolvedReason};
use marketboard_core::resolver::{Resolve, ResolverSettings, ValueResolver};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Sleeps through every resolution and tracks peak concurrency.
struct Stalling {
    stall: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Resolve for Stalling {
    fn resolve(&self, ticker: &str) -> ResolvedQuote {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.stall);
        self.current.fetch_sub(1, Ordering::SeqCst);
        ResolvedQuote::unresolved(ticker, UnresolvedReason::Missing)
    }
}

#[test]
fn slow_ticker_times_out_and_others_complete() {
    let stall = Duration::from_secs(3);
    let source = Arc::new(
        StaticSource::new()
            .with_snapshot("FAST1", json!({ "lastPrice": 1.0 }))
            .with_snapshot("FAST2", json!({ "lastPrice": 2.0 }))
            .with_snapshot("SLOW", json!({ "lastPrice": 3.0 }))
            .with_delay("SLOW", stall),
    );
    let resolver = Arc::new(ValueResolver::new(source, ResolverSettings::default()));
    let settings = DispatchSettings {
        max_workers: 3,
        per_ticker_timeout: Duration::from_millis(300),
    };

    let started = Instant::now();
    let out = dispatch(
        resolver,
        &tickers(&["FAST1", "SLOW", "FAST2"]),
        &settings,
        &SilentProgress,
    );

    assert!(started.elapsed() < stall, "dispatcher waited for the stalled worker");
    assert_eq!(out.len(), 3);
    assert_eq!(out["FAST1"].price.value(), Some(1.0));
    assert_eq!(out["FAST2"].price.value(), Some(2.0));

    let slow = &out["SLOW"];
    assert!(slow.is_empty());
    assert_eq!(slow.price, Resolution::Unresolved(UnresolvedReason::TimedOut));
    assert_eq!(slow.year_high, Resolution::Unresolved(UnresolvedReason::TimedOut));
}

#[test]
fn timed_out_workers_keep_their_slots() {
    // Every resolution outlives its deadline; abandoned workers still count
    // against the cap until they finish.
    let resolver = Arc::new(Stalling {
        stall: Duration::from_millis(250),
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let settings = DispatchSettings {
        max_workers: 2,
        per_ticker_timeout: Duration::from_millis(30),
    };

    let out = dispatch(
        resolver.clone(),
        &tickers(&["A", "B", "C", "D", "E", "F"]),
        &settings,
        &SilentProgress,
    );

    assert_eq!(out.len(), 6);
    for quote in out.values() {
        assert_eq!(quote.price, Resolution::Unresolved(UnresolvedReason::TimedOut));
    }
    assert!(resolver.peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn next_ticker_starts_once_the_stalled_worker_finishes() {
    let source = Arc::new(
        StaticSource::new()
            .with_snapshot("SLOW", json!({ "lastPrice": 3.0 }))
            .with_snapshot("NEXT", json!({ "lastPrice": 4.0 }))
            .with_delay("SLOW", Duration::from_millis(400)),
    );
    let resolver = Arc::new(ValueResolver::new(source, ResolverSettings::default()));
    let settings = DispatchSettings {
        max_workers: 1,
        per_ticker_timeout: Duration::from_millis(100),
    };

    let out = dispatch(resolver, &tickers(&["SLOW", "NEXT"]), &settings, &SilentProgress);

    assert_eq!(out["SLOW"].price, Resolution::Unresolved(UnresolvedReason::TimedOut));
    assert_eq!(out["NEXT"].price.value(), Some(4.0));
}
