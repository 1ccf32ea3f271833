//! Marketboard Core: quote resolution, day cache, dispatcher, HTML board.
//!
//! This crate contains everything behind the `marketboard` binary:
//! - Instrument registry (display name → ticker, in board order)
//! - Tiered value resolver (snapshot, metadata, 1y and 2y history)
//! - Concurrent dispatcher with per-ticker timeouts
//! - Day-granularity JSON cache with atomic writes
//! - Pass orchestration and HTML rendering

pub mod cache;
pub mod coerce;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod pass;
pub mod quote;
pub mod registry;
pub mod render;
pub mod resolver;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with worker threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<quote::ResolvedQuote>();
        require_sync::<quote::ResolvedQuote>();
        require_send::<quote::Resolution>();
        require_sync::<quote::Resolution>();
        require_send::<registry::Registry>();
        require_sync::<registry::Registry>();
        require_send::<cache::CacheEnvelope>();
        require_sync::<cache::CacheEnvelope>();
        require_send::<config::Config>();
        require_sync::<config::Config>();

        require_send::<resolver::ValueResolver>();
        require_sync::<resolver::ValueResolver>();
        require_send::<data::YahooProvider>();
        require_sync::<data::YahooProvider>();
        require_send::<data::StaticSource>();
        require_sync::<data::StaticSource>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();

        require_send::<pass::Context>();
        require_sync::<pass::Context>();
    }

    /// Resolvers are shared across dispatcher threads behind `Arc<dyn Resolve>`.
    #[test]
    fn resolver_is_object_safe() {
        fn _check(r: std::sync::Arc<dyn resolver::Resolve>) -> quote::ResolvedQuote {
            r.resolve("^NSEI")
        }
    }
}
