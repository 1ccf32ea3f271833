//! Resolution pass: cache check, dispatch, persist.
//!
//! ```text
//! IDLE → CHECK_CACHE → FRESH → DONE
//!                    → FRESH (live) → DISPATCH → COLLECT → DONE
//!                    → STALE → DISPATCH → COLLECT → PERSIST → DONE
//! ```
//!
//! Each pass is independent. A forced pass skips the freshness check. A
//! single-ticker pass skips it too and never persists, so a debugging run
//! cannot clobber the full-registry envelope.
//!
//! A live pass fetches prices on every run but keeps the 52-week range from
//! a fresh envelope; the envelope itself is left as it is.

use crate::cache::{is_fresh, CacheEnvelope, DayCache};
use crate::config::Config;
use crate::data::circuit_breaker::CircuitBreaker;
use crate::data::provider::{ProviderError, QuoteProvider};
use crate::data::yahoo::YahooProvider;
use crate::dispatch::{dispatch, PassProgress};
use crate::quote::{ResolvedQuote, UnresolvedReason};
use crate::registry::Registry;
use crate::resolver::{Resolve, ValueResolver};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Everything a pass needs, passed explicitly.
pub struct Context {
    pub config: Config,
    pub registry: Registry,
    pub cache: DayCache,
    resolver: Arc<dyn Resolve>,
}

impl Context {
    pub fn new(config: Config, resolver: Arc<dyn Resolve>) -> Self {
        Self {
            registry: config.registry(),
            cache: DayCache::new(config.cache_path()),
            config,
            resolver,
        }
    }

    /// Context backed by any provider through a [`ValueResolver`].
    pub fn with_provider(config: Config, provider: Arc<dyn QuoteProvider>) -> Self {
        let resolver = ValueResolver::new(provider, config.resolver_settings());
        Self::new(config, Arc::new(resolver))
    }

    /// Context backed by Yahoo Finance.
    pub fn with_yahoo(config: Config) -> Result<Self, ProviderError> {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        let provider = YahooProvider::new(breaker, config.http_timeout())?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    pub fn resolver(&self) -> Arc<dyn Resolve> {
        self.resolver.clone()
    }
}

/// Knobs for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOptions {
    /// Ignore a fresh cache.
    pub force: bool,
    /// Resolve only this ticker (or registry display name); never persisted.
    pub single: Option<String>,
    /// Refetch prices even when the cache is fresh, keeping its 52-week range.
    pub live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    CheckCache,
    Dispatch,
    Collect,
    Persist,
    Done,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassState::Idle => "IDLE",
            PassState::CheckCache => "CHECK_CACHE",
            PassState::Dispatch => "DISPATCH",
            PassState::Collect => "COLLECT",
            PassState::Persist => "PERSIST",
            PassState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// What a pass produced.
#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// Today's cache was reused; nothing was fetched.
    Fresh(CacheEnvelope),
    /// A full pass ran and replaced the envelope (if the write succeeded).
    Refreshed {
        envelope: CacheEnvelope,
        quotes: BTreeMap<String, ResolvedQuote>,
        persisted: bool,
    },
    /// Live prices over today's cached 52-week range; nothing persisted.
    Live {
        envelope: CacheEnvelope,
        quotes: BTreeMap<String, ResolvedQuote>,
    },
    /// A single-ticker debug pass.
    Single(ResolvedQuote),
}

impl PassOutcome {
    /// Quotes keyed by ticker, for display.
    pub fn quotes(&self) -> BTreeMap<String, ResolvedQuote> {
        match self {
            PassOutcome::Fresh(envelope) => envelope.quotes(),
            PassOutcome::Refreshed { quotes, .. } | PassOutcome::Live { quotes, .. } => {
                quotes.clone()
            }
            PassOutcome::Single(quote) => BTreeMap::from([(quote.ticker.clone(), quote.clone())]),
        }
    }

    /// Date the displayed values belong to, if they came from an envelope.
    pub fn cache_date(&self) -> Option<NaiveDate> {
        match self {
            PassOutcome::Fresh(envelope)
            | PassOutcome::Refreshed { envelope, .. }
            | PassOutcome::Live { envelope, .. } => envelope.date,
            PassOutcome::Single(_) => None,
        }
    }
}

fn enter(state: &mut PassState, next: PassState) {
    log::debug!("pass {state} -> {next}");
    *state = next;
}

/// Lay the envelope's 52-week range over freshly fetched quotes. A ticker
/// whose live price did not resolve shows its cached closes instead.
pub fn overlay_cached_range(
    quotes: &mut BTreeMap<String, ResolvedQuote>,
    envelope: &CacheEnvelope,
) {
    let cached = envelope.quotes();
    for (ticker, quote) in quotes.iter_mut() {
        let Some(stored) = cached.get(ticker) else {
            continue;
        };
        if stored.year_high.is_resolved() {
            quote.year_high = stored.year_high;
        }
        if stored.year_low.is_resolved() {
            quote.year_low = stored.year_low;
        }
        if !quote.price.is_resolved() && stored.price.is_resolved() {
            log::debug!("{ticker}: live price unresolved, showing cached close");
            quote.price = stored.price;
            quote.previous_price = stored.previous_price;
            quote.timestamp = stored.timestamp.clone();
        }
        quote.refresh_source_tag();
    }
}

/// Run one pass against `today`'s date.
pub fn run_pass_on(
    ctx: &Context,
    options: &PassOptions,
    today: NaiveDate,
    progress: &dyn PassProgress,
) -> PassOutcome {
    let mut state = PassState::Idle;

    if let Some(query) = options.single.as_deref() {
        let ticker = ctx
            .registry
            .find(query)
            .map(|i| i.ticker.clone())
            .unwrap_or_else(|| query.trim().to_string());
        log::info!("single-ticker pass for {ticker}; cache untouched");
        enter(&mut state, PassState::Dispatch);
        let mut results = dispatch(
            ctx.resolver(),
            std::slice::from_ref(&ticker),
            &ctx.config.dispatch_settings(),
            progress,
        );
        enter(&mut state, PassState::Done);
        let quote = results
            .remove(&ticker)
            .unwrap_or_else(|| ResolvedQuote::unresolved(ticker, UnresolvedReason::WorkerLost));
        return PassOutcome::Single(quote);
    }

    enter(&mut state, PassState::CheckCache);
    let envelope = ctx.cache.load();
    if options.force {
        log::info!("forced refresh; ignoring cache dated {:?}", envelope.date);
    } else if is_fresh(&envelope, today) && options.live {
        enter(&mut state, PassState::Dispatch);
        let tickers = ctx.registry.tickers();
        log::info!("live prices for {} tickers over cached 52-week range", tickers.len());
        let mut quotes = dispatch(
            ctx.resolver(),
            &tickers,
            &ctx.config.dispatch_settings(),
            progress,
        );

        enter(&mut state, PassState::Collect);
        overlay_cached_range(&mut quotes, &envelope);

        enter(&mut state, PassState::Done);
        return PassOutcome::Live { envelope, quotes };
    } else if is_fresh(&envelope, today) {
        log::info!("cache already fresh for {today}; no refresh needed");
        enter(&mut state, PassState::Done);
        return PassOutcome::Fresh(envelope);
    }

    enter(&mut state, PassState::Dispatch);
    let tickers = ctx.registry.tickers();
    log::info!("starting refresh for {} tickers on {today}", tickers.len());
    let quotes = dispatch(
        ctx.resolver(),
        &tickers,
        &ctx.config.dispatch_settings(),
        progress,
    );

    enter(&mut state, PassState::Collect);
    let envelope = CacheEnvelope::from_results(today, ctx.registry.instruments(), &quotes);

    enter(&mut state, PassState::Persist);
    let persisted = ctx.cache.save(&envelope);

    enter(&mut state, PassState::Done);
    PassOutcome::Refreshed {
        envelope,
        quotes,
        persisted,
    }
}

/// Run one pass against the configured local date.
pub fn run_pass(ctx: &Context, options: &PassOptions, progress: &dyn PassProgress) -> PassOutcome {
    run_pass_on(ctx, options, ctx.config.today(), progress)
}
