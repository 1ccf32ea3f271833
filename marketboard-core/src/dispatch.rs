//! Concurrent dispatcher: runs a resolver over many tickers.
//!
//! At most `max_workers` resolutions are in flight. Each runs on its own
//! worker thread and reports back over an mpsc channel; results are
//! collected in completion order. A ticker whose resolution outlives
//! `per_ticker_timeout` (measured from when it started) is recorded as
//! all-unresolved at once.
//!
//! Workers cannot be cancelled. A timed-out worker keeps running until its
//! blocking accessor calls return and holds its slot until then; its late
//! result is dropped. The dispatcher returns without waiting for abandoned
//! workers once every ticker has an entry.

use crate::quote::{ResolvedQuote, UnresolvedReason};
use crate::resolver::Resolve;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub max_workers: usize,
    pub per_ticker_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_workers: 6,
            per_ticker_timeout: Duration::from_secs(20),
        }
    }
}

/// Progress callback for a dispatch batch.
pub trait PassProgress: Send + Sync {
    /// Called once before any ticker starts.
    fn on_start(&self, total: usize);

    /// Called as each ticker completes, times out or is lost.
    fn on_ticker_done(&self, quote: &ResolvedQuote, done: usize, total: usize);

    /// Called when every ticker has an entry.
    fn on_batch_complete(&self, resolved: usize, unresolved: usize, total: usize);
}

/// Simple progress reporter that prints to stdout.
pub struct StdoutProgress;

impl PassProgress for StdoutProgress {
    fn on_start(&self, total: usize) {
        println!("Resolving {total} tickers...");
    }

    fn on_ticker_done(&self, quote: &ResolvedQuote, done: usize, total: usize) {
        if quote.is_empty() {
            println!("[{done}/{total}] {}: no data", quote.ticker);
        } else {
            println!("[{done}/{total}] {}: OK ({})", quote.ticker, quote.source_tag);
        }
    }

    fn on_batch_complete(&self, resolved: usize, unresolved: usize, total: usize) {
        println!("\nResolution complete: {resolved}/{total} with data, {unresolved} without");
    }
}

/// Progress reporter that does nothing.
pub struct SilentProgress;

impl PassProgress for SilentProgress {
    fn on_start(&self, _total: usize) {}
    fn on_ticker_done(&self, _quote: &ResolvedQuote, _done: usize, _total: usize) {}
    fn on_batch_complete(&self, _resolved: usize, _unresolved: usize, _total: usize) {}
}

/// Resolve every ticker. The result holds exactly one entry per distinct
/// requested ticker.
pub fn dispatch(
    resolver: Arc<dyn Resolve>,
    tickers: &[String],
    settings: &DispatchSettings,
    progress: &dyn PassProgress,
) -> BTreeMap<String, ResolvedQuote> {
    let mut unique: Vec<String> = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        if !unique.contains(ticker) {
            unique.push(ticker.clone());
        }
    }

    let total = unique.len();
    let workers = settings.max_workers.max(1);
    let mut results: BTreeMap<String, ResolvedQuote> = BTreeMap::new();
    let mut pending: VecDeque<usize> = (0..total).collect();
    // Spawned workers that have not reported back, timed out or not.
    let mut in_flight: HashSet<usize> = HashSet::new();
    // Workers whose result is still wanted; `None` means no deadline.
    let mut deadlines: HashMap<usize, Option<Instant>> = HashMap::new();
    let (tx, rx) = mpsc::channel::<(usize, ResolvedQuote)>();

    progress.on_start(total);
    log::info!("dispatching {total} tickers on {workers} workers");

    let record = |quote: ResolvedQuote, results: &mut BTreeMap<String, ResolvedQuote>| {
        progress.on_ticker_done(&quote, results.len() + 1, total);
        results.insert(quote.ticker.clone(), quote);
    };

    loop {
        while in_flight.len() < workers {
            let Some(index) = pending.pop_front() else {
                break;
            };
            let ticker = unique[index].clone();
            match spawn_worker(index, ticker.clone(), resolver.clone(), tx.clone()) {
                Ok(()) => {
                    in_flight.insert(index);
                    deadlines.insert(index, deadline_after(settings.per_ticker_timeout));
                }
                Err(e) => {
                    log::error!("{ticker}: failed to spawn worker: {e}");
                    let quote = ResolvedQuote::unresolved(ticker, UnresolvedReason::WorkerLost);
                    record(quote, &mut results);
                }
            }
        }

        if deadlines.is_empty() && pending.is_empty() {
            break;
        }

        let message = match deadlines.values().flatten().min().copied() {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            // Every slot is held by a worker with no deadline or one already
            // abandoned; only a finishing worker frees a slot.
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match message {
            Ok((index, mut quote)) => {
                in_flight.remove(&index);
                if deadlines.remove(&index).is_some() {
                    // Resolvers echo the trimmed ticker; key by what was requested.
                    quote.ticker = unique[index].clone();
                    record(quote, &mut results);
                } else {
                    log::debug!("{}: dropping late result", unique[index]);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                let expired: Vec<usize> = deadlines
                    .iter()
                    .filter(|(_, deadline)| deadline.is_some_and(|d| d <= now))
                    .map(|(index, _)| *index)
                    .collect();
                for index in expired {
                    // The worker keeps its slot until it reports back.
                    deadlines.remove(&index);
                    let ticker = unique[index].clone();
                    log::warn!(
                        "{ticker}: timed out after {:?}, abandoning worker",
                        settings.per_ticker_timeout
                    );
                    let quote = ResolvedQuote::unresolved(ticker, UnresolvedReason::TimedOut);
                    record(quote, &mut results);
                }
            }
            // We hold a sender, so this cannot happen while workers are pending.
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if !in_flight.is_empty() {
        log::debug!("{} abandoned workers still running", in_flight.len());
    }

    // Anything still without an entry never reported back.
    for ticker in &unique {
        if !results.contains_key(ticker) {
            log::error!("{ticker}: no result collected");
            record(
                ResolvedQuote::unresolved(ticker.clone(), UnresolvedReason::WorkerLost),
                &mut results,
            );
        }
    }

    let unresolved = results.values().filter(|q| q.is_empty()).count();
    progress.on_batch_complete(total - unresolved, unresolved, total);
    results
}

/// `None` when the timeout is too large to represent as an instant.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn spawn_worker(
    index: usize,
    ticker: String,
    resolver: Arc<dyn Resolve>,
    tx: Sender<(usize, ResolvedQuote)>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name(format!("marketboard-resolve-{index}"))
        .spawn(move || {
            let quote = panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(&ticker)))
                .unwrap_or_else(|_| {
                    log::error!("{ticker}: resolver panicked");
                    ResolvedQuote::unresolved(ticker.clone(), UnresolvedReason::WorkerLost)
                });
            // The dispatcher may have returned already; nobody to tell.
            let _ = tx.send((index, quote));
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{Resolution, SourceTag};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Echo;

    impl Resolve for Echo {
        fn resolve(&self, ticker: &str) -> ResolvedQuote {
            let mut q = ResolvedQuote::unresolved(ticker, UnresolvedReason::Missing);
            q.price = Resolution::Resolved {
                value: ticker.len() as f64,
                source: SourceTag::Snapshot,
            };
            q.refresh_source_tag();
            q
        }
    }

    /// Tracks peak concurrency.
    struct Counting {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Resolve for Counting {
        fn resolve(&self, ticker: &str) -> ResolvedQuote {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            self.current.fetch_sub(1, Ordering::SeqCst);
            ResolvedQuote::unresolved(ticker, UnresolvedReason::Missing)
        }
    }

    struct Panicky;

    impl Resolve for Panicky {
        fn resolve(&self, ticker: &str) -> ResolvedQuote {
            if ticker == "BOOM" {
                panic!("upstream exploded");
            }
            Echo.resolve(ticker)
        }
    }

    #[derive(Default)]
    struct Recorder {
        done: Mutex<Vec<String>>,
        batch: Mutex<Option<(usize, usize, usize)>>,
    }

    impl PassProgress for Recorder {
        fn on_start(&self, _total: usize) {}
        fn on_ticker_done(&self, quote: &ResolvedQuote, _done: usize, _total: usize) {
            self.done.lock().unwrap().push(quote.ticker.clone());
        }
        fn on_batch_complete(&self, resolved: usize, unresolved: usize, total: usize) {
            *self.batch.lock().unwrap() = Some((resolved, unresolved, total));
        }
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_entry_per_distinct_ticker() {
        let out = dispatch(
            Arc::new(Echo),
            &tickers(&["A", "BB", "A", "CCC"]),
            &DispatchSettings::default(),
            &SilentProgress,
        );
        assert_eq!(out.len(), 3);
        assert_eq!(out["CCC"].price.value(), Some(3.0));
    }

    #[test]
    fn empty_request_gives_empty_map() {
        let out = dispatch(Arc::new(Echo), &[], &DispatchSettings::default(), &SilentProgress);
        assert!(out.is_empty());
    }

    #[test]
    fn respects_worker_cap() {
        let resolver = Arc::new(Counting {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let settings = DispatchSettings {
            max_workers: 2,
            per_ticker_timeout: Duration::from_secs(5),
        };
        let out = dispatch(
            resolver.clone(),
            &tickers(&["A", "B", "C", "D", "E"]),
            &settings,
            &SilentProgress,
        );
        assert_eq!(out.len(), 5);
        assert!(resolver.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        let settings = DispatchSettings {
            max_workers: 2,
            per_ticker_timeout: Duration::from_secs(u64::MAX),
        };
        assert_eq!(deadline_after(settings.per_ticker_timeout), None);

        let out = dispatch(Arc::new(Echo), &tickers(&["A", "BB", "CCC"]), &settings, &SilentProgress);
        assert_eq!(out.len(), 3);
        assert_eq!(out["BB"].price.value(), Some(2.0));
    }

    #[test]
    fn panicking_resolver_is_contained() {
        let out = dispatch(
            Arc::new(Panicky),
            &tickers(&["OK", "BOOM"]),
            &DispatchSettings::default(),
            &SilentProgress,
        );
        assert_eq!(out["OK"].price.value(), Some(2.0));
        assert_eq!(out["BOOM"].price, Resolution::Unresolved(UnresolvedReason::WorkerLost));
    }

    #[test]
    fn progress_sees_every_ticker() {
        let recorder = Recorder::default();
        dispatch(
            Arc::new(Echo),
            &tickers(&["A", "B", "C"]),
            &DispatchSettings::default(),
            &recorder,
        );
        let mut done = recorder.done.lock().unwrap().clone();
        done.sort();
        assert_eq!(done, tickers(&["A", "B", "C"]));
        assert_eq!(*recorder.batch.lock().unwrap(), Some((3, 0, 3)));
    }
}
