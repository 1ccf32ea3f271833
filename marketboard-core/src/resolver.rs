//! Value resolver: tiered per-field resolution for one ticker.
//!
//! Tier order, per field, first usable value wins:
//! 1. snapshot accessor
//! 2. metadata accessor
//! 3. historical bars, 1-year window, widened to 2 years when the first
//!    window has no usable rows
//!
//! A later tier is only queried while some field is still unresolved. Each
//! field is resolved independently, so price and previous price may come
//! from different tiers. An attempt in which every tier failed upstream is
//! retried after a fixed backoff; once attempts run out the quote is
//! returned all-unresolved. Nothing escapes [`Resolve::resolve`].

use crate::config::offset_from_minutes;
use crate::data::history::{summarize, HistorySummary};
use crate::data::normalize::{market_time, normalize_metadata, normalize_snapshot, FieldCandidates};
use crate::data::provider::{Lookback, ProviderError, QuoteProvider};
use crate::quote::{QuoteField, Resolution, ResolvedQuote, SourceTag, UnresolvedReason};
use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;

/// Anything that turns a ticker into a quote without failing.
pub trait Resolve: Send + Sync {
    fn resolve(&self, ticker: &str) -> ResolvedQuote;
}

/// Retry and formatting settings for [`ValueResolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverSettings {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// Offset used to render market timestamps.
    pub utc_offset: FixedOffset,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1500),
            utc_offset: offset_from_minutes(330),
        }
    }
}

/// Resolver backed by a [`QuoteProvider`].
pub struct ValueResolver {
    provider: Arc<dyn QuoteProvider>,
    settings: ResolverSettings,
}

impl ValueResolver {
    pub fn new(provider: Arc<dyn QuoteProvider>, settings: ResolverSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// One pass over all tiers. `Err` only when no tier answered at all.
    fn attempt(&self, ticker: &str) -> Result<ResolvedQuote, ProviderError> {
        let mut quote = ResolvedQuote::unresolved(ticker, UnresolvedReason::Missing);
        let mut answered = false;
        let mut last_error: Option<ProviderError> = None;

        match self.provider.snapshot(ticker) {
            Ok(raw) => {
                answered = true;
                absorb(&mut quote, &normalize_snapshot(&raw), SourceTag::Snapshot);
                quote.timestamp = market_time(&raw, self.settings.utc_offset);
            }
            Err(e) => {
                log::debug!("{ticker}: snapshot failed: {e}");
                last_error = Some(e);
            }
        }

        if !quote.is_complete() {
            match self.provider.metadata(ticker) {
                Ok(raw) => {
                    answered = true;
                    absorb(&mut quote, &normalize_metadata(&raw), SourceTag::Metadata);
                }
                Err(e) => {
                    log::debug!("{ticker}: metadata failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        if !quote.is_complete() {
            for lookback in Lookback::ESCALATION {
                let window = lookback.range_param();
                match self.provider.history(ticker, lookback) {
                    Ok(bars) => {
                        answered = true;
                        if let Some(summary) = summarize(&bars) {
                            absorb(&mut quote, &history_candidates(&summary), lookback.source_tag());
                            if quote.timestamp.is_none() {
                                quote.timestamp =
                                    summary.last_date.map(|d| d.format("%Y-%m-%d").to_string());
                            }
                            break;
                        }
                        log::debug!("{ticker}: {window} history has no usable rows");
                    }
                    Err(e) => {
                        log::debug!("{ticker}: {window} history failed: {e}");
                        last_error = Some(e);
                    }
                }
            }
        }

        if !answered {
            return Err(last_error
                .unwrap_or_else(|| ProviderError::Other("no accessor answered".into())));
        }

        let reason = if last_error.is_some() {
            UnresolvedReason::AccessorFailed
        } else {
            UnresolvedReason::Missing
        };
        for field in QuoteField::ALL {
            let slot = quote.field_mut(field);
            if !slot.is_resolved() {
                *slot = Resolution::Unresolved(reason);
                log::debug!("{ticker}: {field} unresolved ({reason})");
            }
        }
        quote.refresh_source_tag();
        Ok(quote)
    }
}

impl Resolve for ValueResolver {
    fn resolve(&self, ticker: &str) -> ResolvedQuote {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            log::warn!("refusing to resolve an empty ticker");
            return ResolvedQuote::unresolved("", UnresolvedReason::InvalidTicker);
        }

        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.attempt(ticker) {
                Ok(quote) => {
                    log::info!(
                        "{ticker}: price={} previousPrice={} yearHigh={} yearLow={} [{}]",
                        quote.price,
                        quote.previous_price,
                        quote.year_high,
                        quote.year_low,
                        quote.source_tag
                    );
                    return quote;
                }
                Err(e) if !e.is_retryable() => {
                    log::error!("{ticker}: {e}; not retrying");
                    return ResolvedQuote::unresolved(ticker, UnresolvedReason::AccessorFailed);
                }
                Err(e) => {
                    log::warn!("{ticker}: attempt {attempt}/{max_attempts} failed: {e}");
                    if attempt < max_attempts {
                        std::thread::sleep(self.settings.backoff);
                    }
                }
            }
        }

        log::error!("{ticker}: final failure after {max_attempts} attempts");
        ResolvedQuote::unresolved(ticker, UnresolvedReason::RetriesExhausted)
    }
}

fn history_candidates(summary: &HistorySummary) -> FieldCandidates {
    FieldCandidates {
        price: summary.last_close,
        previous_price: summary.prev_close,
        year_high: summary.year_high,
        year_low: summary.year_low,
    }
}

/// Fill still-unresolved fields from `candidates`, logging each decision.
fn absorb(quote: &mut ResolvedQuote, candidates: &FieldCandidates, source: SourceTag) {
    for field in QuoteField::ALL {
        let current = *quote.field(field);
        if current.is_resolved() {
            continue;
        }
        let next = current.or_candidate(candidates.get(field), source);
        if let Some(value) = next.value() {
            log::debug!("{}: {field} = {value} from {source}", quote.ticker);
        }
        *quote.field_mut(field) = next;
    }
}
