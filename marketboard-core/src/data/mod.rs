//! Upstream data access: provider trait, Yahoo client, normalisation

pub mod circuit_breaker;
pub mod fixture;
pub mod history;
pub mod normalize;
pub mod provider;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use fixture::StaticSource;
pub use history::{summarize, HistorySummary};
pub use normalize::{normalize_metadata, normalize_snapshot, FieldCandidates};
pub use provider::{DailyBar, Lookback, ProviderError, QuoteProvider, RawFields};
pub use yahoo::YahooProvider;
