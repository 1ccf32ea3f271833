//! Quote model: per-field resolutions and the resolved quote record.
//!
//! Every numeric field carries a [`Resolution`]: either a value plus the tier
//! that supplied it, or an unresolved marker with a reason code. Absence is a
//! terminal state, not an error; display code renders it as a placeholder.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four numeric fields the resolver fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuoteField {
    Price,
    PreviousPrice,
    YearHigh,
    YearLow,
}

impl QuoteField {
    pub const ALL: [QuoteField; 4] = [
        QuoteField::Price,
        QuoteField::PreviousPrice,
        QuoteField::YearHigh,
        QuoteField::YearLow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuoteField::Price => "price",
            QuoteField::PreviousPrice => "previousPrice",
            QuoteField::YearHigh => "yearHigh",
            QuoteField::YearLow => "yearLow",
        }
    }
}

impl fmt::Display for QuoteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which upstream tier supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTag {
    Snapshot,
    Metadata,
    #[serde(rename = "history-1y")]
    History1y,
    #[serde(rename = "history-2y")]
    History2y,
    Cache,
    /// Computed from other quotes on the board.
    Derived,
}

impl SourceTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::Snapshot => "snapshot",
            SourceTag::Metadata => "metadata",
            SourceTag::History1y => "history-1y",
            SourceTag::History2y => "history-2y",
            SourceTag::Cache => "cache",
            SourceTag::Derived => "derived",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a field has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnresolvedReason {
    /// Every tier answered, none carried a usable value.
    Missing,
    /// No tier supplied the value and at least one tier failed upstream.
    AccessorFailed,
    /// Every attempt failed upstream.
    RetriesExhausted,
    /// The dispatcher gave up waiting for the ticker.
    TimedOut,
    /// The worker died before reporting a result.
    WorkerLost,
    /// Empty ticker identifier.
    InvalidTicker,
    /// The cache envelope holds no entry for the ticker.
    NotCached,
}

impl UnresolvedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            UnresolvedReason::Missing => "missing",
            UnresolvedReason::AccessorFailed => "accessor-failed",
            UnresolvedReason::RetriesExhausted => "retries-exhausted",
            UnresolvedReason::TimedOut => "timed-out",
            UnresolvedReason::WorkerLost => "worker-lost",
            UnresolvedReason::InvalidTicker => "invalid-ticker",
            UnresolvedReason::NotCached => "not-cached",
        }
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one numeric field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved { value: f64, source: SourceTag },
    Unresolved(UnresolvedReason),
}

impl Resolution {
    pub fn value(&self) -> Option<f64> {
        match *self {
            Resolution::Resolved { value, .. } => Some(value),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn source(&self) -> Option<SourceTag> {
        match *self {
            Resolution::Resolved { source, .. } => Some(source),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }

    /// Build from an optional value; `None` becomes `Unresolved(reason)`.
    pub fn from_option(value: Option<f64>, source: SourceTag, reason: UnresolvedReason) -> Self {
        match value {
            Some(value) => Resolution::Resolved { value, source },
            None => Resolution::Unresolved(reason),
        }
    }

    /// Keep an existing value; otherwise take `candidate` from `source`.
    pub fn or_candidate(self, candidate: Option<f64>, source: SourceTag) -> Self {
        match (self, candidate) {
            (Resolution::Resolved { .. }, _) => self,
            (Resolution::Unresolved(_), Some(value)) => Resolution::Resolved { value, source },
            (Resolution::Unresolved(_), None) => self,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Resolved { value, source } => write!(f, "{value} ({source})"),
            Resolution::Unresolved(reason) => write!(f, "none ({reason})"),
        }
    }
}

/// Best-effort quote for one ticker.
///
/// Fields may come from different tiers and time windows; no cross-field
/// consistency is implied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuote {
    pub ticker: String,
    pub price: Resolution,
    pub previous_price: Resolution,
    pub year_high: Resolution,
    pub year_low: Resolution,
    /// Local market time of the price, when known.
    pub timestamp: Option<String>,
    /// Distinct tiers that contributed, joined with `+`, or `none`.
    pub source_tag: String,
}

impl ResolvedQuote {
    /// A quote with every field unresolved for the same reason.
    pub fn unresolved(ticker: impl Into<String>, reason: UnresolvedReason) -> Self {
        let missing = Resolution::Unresolved(reason);
        Self {
            ticker: ticker.into(),
            price: missing,
            previous_price: missing,
            year_high: missing,
            year_low: missing,
            timestamp: None,
            source_tag: "none".into(),
        }
    }

    pub fn field(&self, field: QuoteField) -> &Resolution {
        match field {
            QuoteField::Price => &self.price,
            QuoteField::PreviousPrice => &self.previous_price,
            QuoteField::YearHigh => &self.year_high,
            QuoteField::YearLow => &self.year_low,
        }
    }

    pub fn field_mut(&mut self, field: QuoteField) -> &mut Resolution {
        match field {
            QuoteField::Price => &mut self.price,
            QuoteField::PreviousPrice => &mut self.previous_price,
            QuoteField::YearHigh => &mut self.year_high,
            QuoteField::YearLow => &mut self.year_low,
        }
    }

    /// True when no field resolved.
    pub fn is_empty(&self) -> bool {
        QuoteField::ALL.iter().all(|f| !self.field(*f).is_resolved())
    }

    /// True when every field resolved.
    pub fn is_complete(&self) -> bool {
        QuoteField::ALL.iter().all(|f| self.field(*f).is_resolved())
    }

    /// Absolute change from the previous reference price.
    pub fn change(&self) -> Option<f64> {
        Some(self.price.value()? - self.previous_price.value()?)
    }

    /// Percentage change; `None` when the previous price is zero or missing.
    pub fn change_pct(&self) -> Option<f64> {
        let prev = self.previous_price.value()?;
        if prev == 0.0 {
            return None;
        }
        Some(self.change()? / prev * 100.0)
    }

    /// Recompute `source_tag` from the per-field sources.
    pub fn refresh_source_tag(&mut self) {
        let mut tags: Vec<SourceTag> = Vec::new();
        for field in QuoteField::ALL {
            if let Some(source) = self.field(field).source() {
                if !tags.contains(&source) {
                    tags.push(source);
                }
            }
        }
        self.source_tag = if tags.is_empty() {
            "none".into()
        } else {
            tags.iter().map(|t| t.as_str()).collect::<Vec<_>>().join("+")
        };
    }
}

/// Persisted form of a quote inside the cache envelope.
///
/// Older cache files used other key spellings for the close fields; those
/// are accepted on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedQuote {
    #[serde(default)]
    pub year_high: Option<f64>,
    #[serde(default)]
    pub year_low: Option<f64>,
    #[serde(default, alias = "regularMarketPrice", alias = "lastClose", alias = "closePrice")]
    pub close: Option<f64>,
    #[serde(
        default,
        alias = "prevClose",
        alias = "regularMarketPreviousClose",
        alias = "previous_close"
    )]
    pub previous_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl CachedQuote {
    /// Rehydrate as a quote whose values are tagged as cached.
    pub fn to_quote(&self, ticker: &str) -> ResolvedQuote {
        let cached = |v: Option<f64>| {
            Resolution::from_option(v, SourceTag::Cache, UnresolvedReason::Missing)
        };
        let mut quote = ResolvedQuote {
            ticker: ticker.to_string(),
            price: cached(self.close),
            previous_price: cached(self.previous_close),
            year_high: cached(self.year_high),
            year_low: cached(self.year_low),
            timestamp: self.time.clone(),
            source_tag: String::new(),
        };
        quote.refresh_source_tag();
        quote
    }
}

impl From<&ResolvedQuote> for CachedQuote {
    fn from(quote: &ResolvedQuote) -> Self {
        Self {
            year_high: quote.year_high.value(),
            year_low: quote.year_low.value(),
            close: quote.price.value(),
            previous_close: quote.previous_price.value(),
            time: quote.timestamp.clone(),
        }
    }
}
