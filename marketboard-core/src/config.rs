//! Board configuration, stored as TOML.
//!
//! Every key is optional; a missing file section falls back to the
//! defaults below. Paths for the cache, log and report files are resolved
//! relative to `data_dir`.

use crate::dispatch::DispatchSettings;
use crate::registry::{default_instruments, nifty50_instruments, Instrument, Registry};
use crate::resolver::ResolverSettings;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Offset east of UTC in minutes; out-of-range values fall back to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// `<local data dir>/MorningStatus`, or `./MorningStatus` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("MorningStatus")
}

/// Upper bound for `per_ticker_timeout_secs`: one hour.
pub const MAX_PER_TICKER_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub cache_file: String,
    pub log_file: String,
    pub report_file: String,
    /// Resolutions in flight at once.
    pub max_workers: usize,
    pub per_ticker_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Local calendar offset for cache dates and displayed times. Default IST.
    pub utc_offset_minutes: i32,
    /// Loading page refresh interval.
    pub refresh_secs: u32,
    pub http_timeout_secs: u64,
    pub instruments: Vec<Instrument>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_file: "52w_cache.json".into(),
            log_file: "fetch.log".into(),
            report_file: "report.html".into(),
            max_workers: 6,
            per_ticker_timeout_secs: 20,
            max_attempts: 3,
            retry_backoff_ms: 1500,
            utc_offset_minutes: 330,
            refresh_secs: 3,
            http_timeout_secs: 15,
            instruments: default_instruments(),
        }
    }
}

impl Config {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.per_ticker_timeout_secs == 0 {
            return Err(ConfigError::Invalid("per_ticker_timeout_secs must be positive".into()));
        }
        if self.per_ticker_timeout_secs > MAX_PER_TICKER_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "per_ticker_timeout_secs must be at most {MAX_PER_TICKER_TIMEOUT_SECS}"
            )));
        }
        if let Some(bad) = self
            .instruments
            .iter()
            .find(|i| i.ticker.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "instrument '{}' has an empty ticker",
                bad.display_name
            )));
        }
        Ok(())
    }

    /// Switch to the NIFTY 50 component board. It keeps its own cache and
    /// report files so both boards can share a data directory.
    pub fn use_nifty50_board(&mut self) {
        self.instruments = nifty50_instruments();
        self.cache_file = "daily_cache.json".into();
        self.report_file = "report2.html".into();
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(&self.cache_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join(&self.report_file)
    }

    pub fn utc_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes)
    }

    /// Today's calendar date at the configured offset.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.utc_offset()).date_naive()
    }

    pub fn registry(&self) -> Registry {
        Registry::new(self.instruments.clone())
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
            utc_offset: self.utc_offset(),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            max_workers: self.max_workers.max(1),
            per_ticker_timeout: Duration::from_secs(self.per_ticker_timeout_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
