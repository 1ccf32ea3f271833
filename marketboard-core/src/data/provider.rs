//! Quote provider trait and structured error types.
//!
//! The QuoteProvider trait abstracts over the three upstream accessors
//! (snapshot, metadata, historical bars) so the resolver can run against
//! Yahoo Finance in production and a static fixture in tests.

use crate::quote::SourceTag;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Loosely-typed field set returned by the snapshot and metadata accessors.
pub type RawFields = serde_json::Map<String, serde_json::Value>;

/// One daily bar from the historical accessor. Missing cells are NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl DailyBar {
    pub fn new(date: NaiveDate, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            high,
            low,
            close,
        }
    }
}

/// Lookback window for the historical accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookback {
    OneYear,
    TwoYears,
}

impl Lookback {
    /// Escalation order: the wider window is only tried when the narrower one yields nothing.
    pub const ESCALATION: [Lookback; 2] = [Lookback::OneYear, Lookback::TwoYears];

    /// Range parameter understood by the chart endpoint.
    pub fn range_param(self) -> &'static str {
        match self {
            Lookback::OneYear => "1y",
            Lookback::TwoYears => "2y",
        }
    }

    pub fn source_tag(self) -> SourceTag {
        match self {
            Lookback::OneYear => SourceTag::History1y,
            Lookback::TwoYears => SourceTag::History2y,
        }
    }
}

/// Structured error types for upstream accessor calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether another attempt after a backoff could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::SymbolNotFound { .. }
                | ProviderError::CircuitBreakerTripped
                | ProviderError::AuthenticationRequired(_)
        )
    }
}

/// Upstream quote source with three accessors of increasing cost.
///
/// All calls are blocking. Implementations must not cache across calls;
/// the day cache sits above this trait.
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Lightweight current-state field set.
    fn snapshot(&self, ticker: &str) -> Result<RawFields, ProviderError>;

    /// Broader descriptive and market field set.
    fn metadata(&self, ticker: &str) -> Result<RawFields, ProviderError>;

    /// Daily bars over the lookback window, oldest first.
    fn history(&self, ticker: &str, lookback: Lookback) -> Result<Vec<DailyBar>, ProviderError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool {
        true
    }
}
