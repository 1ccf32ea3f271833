//! Day-granularity cache: one JSON envelope per file.
//!
//! ```json
//! {
//!   "date": "YYYY-MM-DD",
//!   "symbols": { "Sensex": "^BSESN", ... },
//!   "values": { "^BSESN": {"yearHigh": .., "yearLow": .., "close": .., "previousClose": ..} }
//! }
//! ```
//!
//! - The envelope is fresh iff its date equals today's local date.
//! - Writes are atomic (write to .tmp, rename into place) and replace the
//!   whole envelope; entries are never merged.
//! - `symbols` is optional (older files lack it) and keeps its key order.
//! - `load` and `save` never fail: unreadable files read as an empty
//!   envelope and write errors leave the previous file in place.

use crate::quote::{CachedQuote, ResolvedQuote};
use crate::registry::{Instrument, Registry};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file not found: {0}")]
    NotFound(PathBuf),

    #[error("cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The persisted cache document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ordered_symbols")]
    pub symbols: Option<Vec<Instrument>>,
    #[serde(default)]
    pub values: BTreeMap<String, CachedQuote>,
}

impl CacheEnvelope {
    /// Build an envelope for a completed pass.
    pub fn from_results(
        date: NaiveDate,
        instruments: &[Instrument],
        results: &BTreeMap<String, ResolvedQuote>,
    ) -> Self {
        Self {
            date: Some(date),
            symbols: Some(instruments.to_vec()),
            values: results
                .iter()
                .map(|(ticker, quote)| (ticker.clone(), CachedQuote::from(quote)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.symbols.is_none() && self.values.is_empty()
    }

    /// The registry the envelope was written for, or `fallback` for older
    /// files without a `symbols` mapping.
    pub fn registry_or(&self, fallback: &Registry) -> Registry {
        match &self.symbols {
            Some(symbols) if !symbols.is_empty() => Registry::new(symbols.clone()),
            _ => fallback.clone(),
        }
    }

    /// Cached values rehydrated as quotes, keyed by ticker.
    pub fn quotes(&self) -> BTreeMap<String, ResolvedQuote> {
        self.values
            .iter()
            .map(|(ticker, cached)| (ticker.clone(), cached.to_quote(ticker)))
            .collect()
    }
}

/// True iff the envelope was written on `today`.
pub fn is_fresh(envelope: &CacheEnvelope, today: NaiveDate) -> bool {
    envelope.date == Some(today)
}

/// File-backed envelope store.
#[derive(Debug, Clone)]
pub struct DayCache {
    path: PathBuf,
}

impl DayCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict read.
    pub fn try_load(&self) -> Result<CacheEnvelope, CacheError> {
        let content = fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CacheError::NotFound(self.path.clone())
            } else {
                CacheError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read the envelope; any failure yields an empty one.
    pub fn load(&self) -> CacheEnvelope {
        match self.try_load() {
            Ok(envelope) => envelope,
            Err(CacheError::NotFound(path)) => {
                log::debug!("no cache at {}", path.display());
                CacheEnvelope::default()
            }
            Err(e) => {
                log::warn!("ignoring unreadable cache: {e}");
                CacheEnvelope::default()
            }
        }
    }

    /// Strict atomic write.
    pub fn try_save(&self, envelope: &CacheEnvelope) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(envelope)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_err)?;

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(e)
        })
    }

    /// Write the envelope; failures are logged and reported as `false`.
    pub fn save(&self, envelope: &CacheEnvelope) -> bool {
        match self.try_save(envelope) {
            Ok(()) => {
                log::info!("saved cache to {}", self.path.display());
                true
            }
            Err(e) => {
                log::error!("save cache failed: {e}");
                false
            }
        }
    }
}

/// `symbols` as a JSON object whose key order is the registry order.
mod ordered_symbols {
    use crate::registry::Instrument;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        symbols: &Option<Vec<Instrument>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match symbols {
            None => serializer.serialize_none(),
            Some(list) => {
                let mut map = serializer.serialize_map(Some(list.len()))?;
                for inst in list {
                    map.serialize_entry(&inst.display_name, &inst.ticker)?;
                }
                map.end()
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<Instrument>>, D::Error> {
        Ok(Option::<Ordered>::deserialize(deserializer)?.map(|o| o.0))
    }

    struct Ordered(Vec<Instrument>);

    impl<'de> Deserialize<'de> for Ordered {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_map(OrderedVisitor)
        }
    }

    struct OrderedVisitor;

    impl<'de> Visitor<'de> for OrderedVisitor {
        type Value = Ordered;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of display name to ticker")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Ordered, A::Error> {
            let mut list = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, ticker)) = access.next_entry::<String, String>()? {
                list.push(Instrument::new(name, ticker));
            }
            Ok(Ordered(list))
        }
    }
}
