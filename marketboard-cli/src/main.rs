//! Marketboard CLI: fetch, board and cache commands.
//!
//! Commands:
//! - `fetch`: run a resolution pass and update the day cache
//! - `board`: write the HTML dashboard, refreshing the cache in the background
//! - `cache status`: report cache date, freshness and cached values
//!
//! `--preset nifty50` switches any command to the NIFTY 50 component board.

mod logging;

use anyhow::{Context as _, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use marketboard_core::cache::{is_fresh, DayCache};
use marketboard_core::config::Config;
use marketboard_core::dispatch::{SilentProgress, StdoutProgress};
use marketboard_core::pass::{run_pass, Context, PassOptions, PassOutcome};
use marketboard_core::quote::{ResolvedQuote, UnresolvedReason};
use marketboard_core::registry::{Instrument, Registry};
use marketboard_core::render::{board_page, format_amount, loading_page, VALUE_PLACEHOLDER};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(
    name = "marketboard",
    about = "Marketboard: morning market board with a day-granularity cache"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for cache, log and report files.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Instrument set to show.
    #[arg(long, global = true, value_enum, default_value_t = Preset::Market)]
    preset: Preset,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// Instruments from the config file, or the built-in market board.
    Market,
    /// NIFTY 50 components, with their own cache and report files.
    Nifty50,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every registry ticker and update the cache.
    Fetch {
        /// Refresh even if today's cache exists.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Resolve one ticker (or display name) only; the cache is not written.
        #[arg(long)]
        single: Option<String>,

        /// Refetch prices even if today's cache exists, keeping its 52-week range.
        #[arg(long, default_value_t = false)]
        live: bool,
    },
    /// Write the HTML board and open it in a browser.
    Board {
        /// Refresh even if today's cache exists.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Resolve one ticker (or display name) only; the cache is not written.
        #[arg(long)]
        single: Option<String>,

        /// Refetch prices even if today's cache exists, keeping its 52-week range.
        #[arg(long, default_value_t = false, conflicts_with = "offline")]
        live: bool,

        /// Render from the last cache without fetching.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Do not open a browser.
        #[arg(long, default_value_t = false)]
        no_open: bool,

        /// Output HTML path. Defaults to report.html in the data directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cache path, date, freshness and values.
    Status,
}

fn main() {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), cli.data_dir, cli.preset);
    let log_path = config
        .as_ref()
        .map(Config::log_path)
        .unwrap_or_else(|_| Config::default().log_path());
    if let Err(e) = logging::init_logger(&log_path) {
        logging::init_stderr_logger();
        log::warn!("file logging unavailable: {e:#}");
    }

    let result = config.and_then(|config| match cli.command {
        Commands::Fetch {
            force,
            single,
            live,
        } => run_fetch(config, PassOptions { force, single, live }),
        Commands::Board {
            force,
            single,
            live,
            offline,
            no_open,
            output,
        } => {
            let options = PassOptions { force, single, live };
            run_board(config, options, offline, !no_open, output)
        }
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
        },
    });

    if let Err(e) = result {
        log::error!("{e:#}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>, preset: Preset) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => Config::default(),
    };
    if preset == Preset::Nifty50 {
        config.use_nifty50_board();
    }
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

fn now_local(config: &Config) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&config.utc_offset())
}

fn run_fetch(config: Config, options: PassOptions) -> Result<()> {
    let ctx = Context::with_yahoo(config).context("build Yahoo client")?;
    log::info!(
        "fetch started (force={}, live={}, single={:?})",
        options.force,
        options.live,
        options.single
    );

    match run_pass(&ctx, &options, &StdoutProgress) {
        PassOutcome::Fresh(envelope) => {
            let date = envelope.date.map(|d| d.to_string()).unwrap_or_default();
            println!("Cache already fresh for {date}; use --force to refresh.");
        }
        PassOutcome::Refreshed {
            quotes, persisted, ..
        } => {
            if persisted {
                println!(
                    "Saved {} quotes to {}",
                    quotes.len(),
                    ctx.cache.path().display()
                );
            } else {
                println!("Warning: cache was not saved; see the log for details.");
            }
        }
        PassOutcome::Live { envelope, quotes } => {
            let date = envelope.date.map(|d| d.to_string()).unwrap_or_default();
            println!("Fetched {} live prices; 52-week range from cache dated {date}.", quotes.len());
        }
        PassOutcome::Single(quote) => print_quote(&quote),
    }
    Ok(())
}

fn print_quote(quote: &ResolvedQuote) {
    let ticker = quote.ticker.as_str();
    println!("{ticker} ({})", quote.source_tag);
    println!("  price:      {}", format_amount(quote.price.value(), ticker, VALUE_PLACEHOLDER));
    println!(
        "  previous:   {}",
        format_amount(quote.previous_price.value(), ticker, VALUE_PLACEHOLDER)
    );
    println!("  52w high:   {}", format_amount(quote.year_high.value(), ticker, VALUE_PLACEHOLDER));
    println!("  52w low:    {}", format_amount(quote.year_low.value(), ticker, VALUE_PLACEHOLDER));
    if let Some(time) = &quote.timestamp {
        println!("  time:       {time}");
    }
}

/// Write through a temp file so a polling browser never sees a partial page.
fn write_page(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create report directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("html.tmp");
    fs::write(&tmp_path, html).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn open_in_browser(path: &Path) {
    let target = path.to_string_lossy().into_owned();

    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(&target);
        c
    };
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut c = Command::new("open");
        c.arg(&target);
        c
    };
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = {
        let mut c = Command::new("xdg-open");
        c.arg(&target);
        c
    };

    match command.spawn() {
        Ok(_) => log::info!("opened {target} in browser"),
        Err(e) => log::warn!("could not open browser for {target}: {e}"),
    }
}

/// What the board shows: which instruments, their quotes and the cache date.
struct BoardData {
    registry: Registry,
    quotes: BTreeMap<String, ResolvedQuote>,
    cache_date: Option<chrono::NaiveDate>,
}

impl BoardData {
    fn from_cache(cache: &DayCache, fallback: &Registry) -> Self {
        let envelope = cache.load();
        Self {
            registry: envelope.registry_or(fallback),
            quotes: envelope.quotes(),
            cache_date: envelope.date,
        }
    }

    fn from_outcome(outcome: &PassOutcome, ctx: &Context) -> Self {
        let registry = match outcome {
            PassOutcome::Fresh(envelope) => envelope.registry_or(&ctx.registry),
            PassOutcome::Refreshed { .. } | PassOutcome::Live { .. } => ctx.registry.clone(),
            PassOutcome::Single(quote) => {
                let name = ctx
                    .registry
                    .display_name(&quote.ticker)
                    .unwrap_or(quote.ticker.as_str())
                    .to_string();
                Registry::new(vec![Instrument::new(name, quote.ticker.clone())])
            }
        };
        Self {
            registry,
            quotes: outcome.quotes(),
            cache_date: outcome.cache_date(),
        }
    }

    fn render(&self, config: &Config) -> String {
        board_page(&self.registry, &self.quotes, now_local(config), self.cache_date)
    }
}

fn run_board(
    config: Config,
    options: PassOptions,
    offline: bool,
    open: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let report_path = output.unwrap_or_else(|| config.report_path());

    if offline {
        let data = BoardData::from_cache(&DayCache::new(config.cache_path()), &config.registry());
        log::info!("offline board from cache dated {:?}", data.cache_date);
        write_page(&report_path, &data.render(&config))?;
        if open {
            open_in_browser(&report_path);
        }
        println!("Board written to {}", report_path.display());
        return Ok(());
    }

    write_page(&report_path, &loading_page(now_local(&config), config.refresh_secs))?;
    if open {
        open_in_browser(&report_path);
    }

    refresh_board(config, options, &report_path, |config| {
        Context::with_yahoo(config).context("build Yahoo client")
    })?;
    println!("Board written to {}", report_path.display());
    Ok(())
}

/// Replace the loading page at `report_path` with the board.
///
/// Every path out of here overwrites the loading page. When no context can
/// be built the cached board is written and the build error returned; when
/// the background pass panics the cached board is written instead.
fn refresh_board<F>(
    config: Config,
    options: PassOptions,
    report_path: &Path,
    build: F,
) -> Result<()>
where
    F: FnOnce(Config) -> Result<Context>,
{
    let ctx = match build(config.clone()) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            log::error!("{e:#}; rendering the cached board");
            let data = BoardData::from_cache(&DayCache::new(config.cache_path()), &config.registry());
            if let Err(write_err) = write_page(report_path, &data.render(&config)) {
                log::error!("{write_err:#}");
            }
            return Err(e);
        }
    };

    let worker_ctx = Arc::clone(&ctx);
    let spawned = thread::Builder::new()
        .name("marketboard-pass".into())
        .spawn(move || {
            let outcome = run_pass(&worker_ctx, &options, &SilentProgress);
            BoardData::from_outcome(&outcome, &worker_ctx)
        });

    let data = match spawned {
        Ok(handle) => handle.join().unwrap_or_else(|_| {
            log::error!("background pass panicked; rendering from cache");
            BoardData::from_cache(&ctx.cache, &ctx.registry)
        }),
        Err(e) => {
            log::error!("spawn background pass: {e}; rendering from cache");
            BoardData::from_cache(&ctx.cache, &ctx.registry)
        }
    };

    write_page(report_path, &data.render(&ctx.config))
}

fn run_cache_status(config: &Config) -> Result<()> {
    let cache = DayCache::new(config.cache_path());
    println!("Cache: {}", cache.path().display());

    let envelope = match cache.try_load() {
        Ok(envelope) => envelope,
        Err(e) => {
            println!("Cache unavailable: {e}");
            return Ok(());
        }
    };

    let today = config.today();
    match envelope.date {
        Some(date) => println!(
            "Date: {date} ({})",
            if is_fresh(&envelope, today) { "fresh" } else { "stale" }
        ),
        None => println!("Date: (none)"),
    }
    println!("Quotes: {}", envelope.values.len());
    println!();

    let registry = envelope.registry_or(&config.registry());
    let quotes = envelope.quotes();
    println!(
        "{:<22} {:<14} {:>16} {:>16} {:>16}",
        "Instrument", "Ticker", "Close", "52w Low", "52w High"
    );
    println!("{}", "-".repeat(88));
    for inst in registry.instruments() {
        let ticker = inst.ticker.as_str();
        let quote = quotes
            .get(ticker)
            .cloned()
            .unwrap_or_else(|| ResolvedQuote::unresolved(ticker, UnresolvedReason::NotCached));
        println!(
            "{:<22} {:<14} {:>16} {:>16} {:>16}",
            inst.display_name,
            ticker,
            format_amount(quote.price.value(), ticker, VALUE_PLACEHOLDER),
            format_amount(quote.year_low.value(), ticker, VALUE_PLACEHOLDER),
            format_amount(quote.year_high.value(), ticker, VALUE_PLACEHOLDER),
        );
    }
    Ok(())
}
