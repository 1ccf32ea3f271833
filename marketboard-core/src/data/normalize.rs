//! Per-accessor alias normalisation.
//!
//! Each accessor spells the same quantity several ways depending on symbol
//! type and API revision. The alias tables below are the only place that
//! knows those spellings; everything downstream sees [`FieldCandidates`].

use super::provider::RawFields;
use crate::coerce::coerce_opt;
use crate::quote::QuoteField;
use chrono::{DateTime, FixedOffset};

/// Candidate values for the four canonical fields from one accessor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldCandidates {
    pub price: Option<f64>,
    pub previous_price: Option<f64>,
    pub year_high: Option<f64>,
    pub year_low: Option<f64>,
}

impl FieldCandidates {
    pub fn get(&self, field: QuoteField) -> Option<f64> {
        match field {
            QuoteField::Price => self.price,
            QuoteField::PreviousPrice => self.previous_price,
            QuoteField::YearHigh => self.year_high,
            QuoteField::YearLow => self.year_low,
        }
    }

    pub fn is_empty(&self) -> bool {
        QuoteField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

/// Known key spellings per canonical field, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct AliasTable {
    pub price: &'static [&'static str],
    pub previous_price: &'static [&'static str],
    pub year_high: &'static [&'static str],
    pub year_low: &'static [&'static str],
}

impl AliasTable {
    fn aliases(&self, field: QuoteField) -> &'static [&'static str] {
        match field {
            QuoteField::Price => self.price,
            QuoteField::PreviousPrice => self.previous_price,
            QuoteField::YearHigh => self.year_high,
            QuoteField::YearLow => self.year_low,
        }
    }

    /// Map a raw field set onto canonical candidates.
    pub fn normalize(&self, raw: &RawFields) -> FieldCandidates {
        let pick = |field| first_alias(raw, self.aliases(field));
        FieldCandidates {
            price: pick(QuoteField::Price),
            previous_price: pick(QuoteField::PreviousPrice),
            year_high: pick(QuoteField::YearHigh),
            year_low: pick(QuoteField::YearLow),
        }
    }
}

pub const SNAPSHOT_ALIASES: AliasTable = AliasTable {
    price: &["lastPrice", "last_price", "regularMarketPrice", "last_close"],
    previous_price: &[
        "previousClose",
        "previous_close",
        "regularMarketPreviousClose",
        "chartPreviousClose",
    ],
    year_high: &["yearHigh", "fiftyTwoWeekHigh", "52WeekHigh"],
    year_low: &["yearLow", "fiftyTwoWeekLow", "52WeekLow"],
};

pub const METADATA_ALIASES: AliasTable = AliasTable {
    price: &["regularMarketPrice", "currentPrice", "close", "lastClose"],
    previous_price: &[
        "previousClose",
        "regularMarketPreviousClose",
        "previous_close",
    ],
    year_high: &["fiftyTwoWeekHigh", "52WeekHigh", "yearHigh"],
    year_low: &["fiftyTwoWeekLow", "52WeekLow", "yearLow"],
};

/// First alias whose value coerces to a number.
fn first_alias(raw: &RawFields, aliases: &[&str]) -> Option<f64> {
    aliases.iter().find_map(|key| coerce_opt(raw.get(*key)))
}

pub fn normalize_snapshot(raw: &RawFields) -> FieldCandidates {
    SNAPSHOT_ALIASES.normalize(raw)
}

pub fn normalize_metadata(raw: &RawFields) -> FieldCandidates {
    METADATA_ALIASES.normalize(raw)
}

/// Market time of the snapshot (`regularMarketTime`, epoch seconds) as local `HH:MM`.
pub fn market_time(raw: &RawFields, offset: FixedOffset) -> Option<String> {
    let secs = raw.get("regularMarketTime")?.as_i64()?;
    let utc = DateTime::from_timestamp(secs, 0)?;
    Some(utc.with_timezone(&offset).format("%H:%M").to_string())
}
