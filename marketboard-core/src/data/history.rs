//! Derivation of quote fields from a daily bar series.

use super::provider::DailyBar;
use chrono::NaiveDate;

/// Fields derived from one historical window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySummary {
    /// Max of daily highs.
    pub year_high: Option<f64>,
    /// Min of daily lows.
    pub year_low: Option<f64>,
    /// Last valid close.
    pub last_close: Option<f64>,
    /// Second-to-last valid close.
    pub prev_close: Option<f64>,
    pub last_date: Option<NaiveDate>,
}

/// Summarise bars given oldest first. NaN cells are skipped.
///
/// Returns `None` when the series has no usable row, which tells the
/// resolver to widen the lookback.
pub fn summarize(bars: &[DailyBar]) -> Option<HistorySummary> {
    let year_high = bars
        .iter()
        .map(|b| b.high)
        .filter(|v| v.is_finite())
        .reduce(f64::max);
    let year_low = bars
        .iter()
        .map(|b| b.low)
        .filter(|v| v.is_finite())
        .reduce(f64::min);

    let mut closes = bars.iter().rev().filter(|b| b.close.is_finite());
    let last = closes.next();
    let prev = closes.next();

    if year_high.is_none() && year_low.is_none() && last.is_none() {
        return None;
    }

    Some(HistorySummary {
        year_high,
        year_low,
        last_close: last.map(|b| b.close),
        prev_close: prev.map(|b| b.close),
        last_date: last.map(|b| b.date),
    })
}
