//! In-memory quote provider for tests and offline demos.
//!
//! Responses are registered per ticker up front. Unregistered tickers answer
//! with empty field sets and empty histories. Failures are scripted per
//! attempt: a snapshot call opens an attempt, and every accessor call in a
//! failing attempt errors.

use super::provider::{DailyBar, Lookback, ProviderError, QuoteProvider, RawFields};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct StaticSource {
    snapshots: HashMap<String, RawFields>,
    metadata: HashMap<String, RawFields>,
    history: HashMap<(String, Lookback), Vec<DailyBar>>,
    failing_attempts: HashMap<String, u32>,
    delays: HashMap<String, Duration>,
    attempts: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
}

fn object(value: serde_json::Value) -> RawFields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => RawFields::new(),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot field set (a JSON object).
    pub fn with_snapshot(mut self, ticker: &str, fields: serde_json::Value) -> Self {
        self.snapshots.insert(ticker.to_string(), object(fields));
        self
    }

    /// Register a metadata field set (a JSON object).
    pub fn with_metadata(mut self, ticker: &str, fields: serde_json::Value) -> Self {
        self.metadata.insert(ticker.to_string(), object(fields));
        self
    }

    pub fn with_history(mut self, ticker: &str, lookback: Lookback, bars: Vec<DailyBar>) -> Self {
        self.history.insert((ticker.to_string(), lookback), bars);
        self
    }

    /// Make the first `attempts` resolution attempts for `ticker` fail upstream.
    pub fn failing_attempts(mut self, ticker: &str, attempts: u32) -> Self {
        self.failing_attempts.insert(ticker.to_string(), attempts);
        self
    }

    /// Sleep this long inside every snapshot call for `ticker`.
    pub fn with_delay(mut self, ticker: &str, delay: Duration) -> Self {
        self.delays.insert(ticker.to_string(), delay);
        self
    }

    /// Accessor calls so far, as `accessor:ticker` strings.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of attempts opened for `ticker`.
    pub fn attempts(&self, ticker: &str) -> u32 {
        lock(&self.attempts).get(ticker).copied().unwrap_or(0)
    }

    fn gate(&self, accessor: &str, ticker: &str, opens_attempt: bool) -> Result<(), ProviderError> {
        lock(&self.calls).push(format!("{accessor}:{ticker}"));

        let attempt = {
            let mut attempts = lock(&self.attempts);
            let n = attempts.entry(ticker.to_string()).or_insert(0);
            if opens_attempt {
                *n += 1;
            }
            *n
        };

        match self.failing_attempts.get(ticker) {
            Some(&limit) if attempt <= limit => Err(ProviderError::NetworkUnreachable(format!(
                "scripted failure for {ticker} (attempt {attempt})"
            ))),
            _ => Ok(()),
        }
    }
}

impl QuoteProvider for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn snapshot(&self, ticker: &str) -> Result<RawFields, ProviderError> {
        if let Some(delay) = self.delays.get(ticker) {
            std::thread::sleep(*delay);
        }
        self.gate("snapshot", ticker, true)?;
        Ok(self.snapshots.get(ticker).cloned().unwrap_or_default())
    }

    fn metadata(&self, ticker: &str) -> Result<RawFields, ProviderError> {
        self.gate("metadata", ticker, false)?;
        Ok(self.metadata.get(ticker).cloned().unwrap_or_default())
    }

    fn history(&self, ticker: &str, lookback: Lookback) -> Result<Vec<DailyBar>, ProviderError> {
        self.gate(&format!("history-{}", lookback.range_param()), ticker, false)?;
        Ok(self
            .history
            .get(&(ticker.to_string(), lookback))
            .cloned()
            .unwrap_or_default())
    }
}
