//! HTML board rendering.
//!
//! Rows follow registry order, then the derived INR gold/silver rows. Every
//! missing value renders as a placeholder, so a page always renders even
//! when nothing resolved.

use crate::quote::{QuoteField, Resolution, ResolvedQuote, SourceTag, UnresolvedReason};
use crate::registry::Registry;
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};
use std::collections::BTreeMap;

pub const PRICE_PLACEHOLDER: &str = "N/A";
pub const VALUE_PLACEHOLDER: &str = "—";

const USD_INR: &str = "USDINR=X";
const GOLD_USD: &str = "GC=F";
const SILVER_USD: &str = "SI=F";
pub const GOLD_INR: &str = "GC=F-INR";
pub const SILVER_INR: &str = "SI=F-INR";

/// Troy ounces to 10 grams.
const GOLD_OZ_PER_10G_DIVISOR: f64 = 3.11035;
/// Grams per troy ounce.
const GRAMS_PER_OZ: f64 = 31.1035;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn of(change: Option<f64>) -> Self {
        match change {
            Some(c) if c > 0.0 => Direction::Up,
            Some(c) if c < 0.0 => Direction::Down,
            _ => Direction::Neutral,
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Neutral => "neutral",
        }
    }
}

/// One formatted table row.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRow {
    pub display_name: String,
    pub ticker: String,
    pub price: String,
    pub change: String,
    pub change_pct: String,
    pub direction: Direction,
    pub time: String,
    pub year_low: String,
    pub year_high: String,
    pub source: String,
}

/// Currency suffix shown after amounts.
pub fn currency_suffix(ticker: &str) -> &'static str {
    match ticker {
        "BTC-USD" | "BZ=F" | "GC=F" | "SI=F" => "$",
        t if t.ends_with(".NS") || t.starts_with('^') || t.contains("INR") => "₹",
        _ => "$",
    }
}

/// Fixed decimals with thousands separators; `None` for non-finite input.
pub fn format_number(value: f64, decimals: usize) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let digits = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits.as_str(), None),
    };

    let mut out = String::with_capacity(digits.len() + int_part.len() / 3 + 1);
    if value < 0.0 && digits.chars().any(|c| matches!(c, '1'..='9')) {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    Some(out)
}

/// Amount with currency suffix, or `placeholder`.
pub fn format_amount(value: Option<f64>, ticker: &str, placeholder: &str) -> String {
    value
        .and_then(|v| format_number(v, 2))
        .map(|s| format!("{s} {}", currency_suffix(ticker)))
        .unwrap_or_else(|| placeholder.to_string())
}

fn format_signed(value: Option<f64>, suffix: &str) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:+.2}{suffix}"),
        _ => VALUE_PLACEHOLDER.to_string(),
    }
}

pub fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good Morning",
        12..=16 => "Good Afternoon",
        17..=21 => "Good Evening",
        _ => "Hello",
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

fn derived_quote(key: &str, price: f64, timestamp: Option<String>) -> ResolvedQuote {
    let mut quote = ResolvedQuote::unresolved(key, UnresolvedReason::Missing);
    quote.price = Resolution::Resolved {
        value: price,
        source: SourceTag::Derived,
    };
    quote.timestamp = timestamp;
    quote.refresh_source_tag();
    quote
}

/// INR gold (per 10 g) and silver (per kg), when both inputs resolved.
pub fn derived_quotes(quotes: &BTreeMap<String, ResolvedQuote>) -> Vec<(String, ResolvedQuote)> {
    let price = |ticker: &str| quotes.get(ticker).and_then(|q| q.price.value());
    let time = |ticker: &str| quotes.get(ticker).and_then(|q| q.timestamp.clone());

    let mut derived = Vec::new();
    let Some(usd_inr) = price(USD_INR) else {
        return derived;
    };
    if let Some(gold) = price(GOLD_USD) {
        let inr_per_10g = gold * usd_inr / GOLD_OZ_PER_10G_DIVISOR;
        derived.push((
            "Gold (INR/10g)".to_string(),
            derived_quote(GOLD_INR, inr_per_10g, time(GOLD_USD)),
        ));
    }
    if let Some(silver) = price(SILVER_USD) {
        let inr_per_kg = silver * usd_inr * (1000.0 / GRAMS_PER_OZ);
        derived.push((
            "Silver (INR/kg)".to_string(),
            derived_quote(SILVER_INR, inr_per_kg, time(SILVER_USD)),
        ));
    }
    derived
}

pub fn row_for(display_name: &str, ticker: &str, quote: Option<&ResolvedQuote>) -> BoardRow {
    let value = |field: QuoteField| quote.and_then(|q| q.field(field).value());
    let change = quote.and_then(|q| q.change());

    BoardRow {
        display_name: display_name.to_string(),
        ticker: ticker.to_string(),
        price: format_amount(value(QuoteField::Price), ticker, PRICE_PLACEHOLDER),
        change: format_signed(change, ""),
        change_pct: format_signed(quote.and_then(|q| q.change_pct()), "%"),
        direction: Direction::of(change),
        time: quote.and_then(|q| q.timestamp.clone()).unwrap_or_default(),
        year_low: format_amount(value(QuoteField::YearLow), ticker, VALUE_PLACEHOLDER),
        year_high: format_amount(value(QuoteField::YearHigh), ticker, VALUE_PLACEHOLDER),
        source: quote.map(|q| q.source_tag.clone()).unwrap_or_else(|| "none".into()),
    }
}

/// Registry rows in registry order, then derived rows.
pub fn board_rows(registry: &Registry, quotes: &BTreeMap<String, ResolvedQuote>) -> Vec<BoardRow> {
    let mut rows: Vec<BoardRow> = registry
        .instruments()
        .iter()
        .map(|inst| row_for(&inst.display_name, &inst.ticker, quotes.get(&inst.ticker)))
        .collect();
    for (name, quote) in derived_quotes(quotes) {
        rows.push(row_for(&name, &quote.ticker, Some(&quote)));
    }
    rows
}

const STYLE: &str = "body{font-family:Segoe UI,Roboto,Arial,sans-serif;background:#f7fafc;margin:18px;color:#0f172a}\
.card{max-width:1040px;margin:18px auto;background:#fff;padding:18px;border-radius:10px;box-shadow:0 6px 18px rgba(2,6,23,0.06)}\
h1{margin:0;font-size:20px}.sub{color:#475569;margin-top:6px;font-size:13px}\
table{width:100%;border-collapse:collapse;margin-top:12px;font-variant-numeric:tabular-nums}\
th,td{padding:10px 8px;font-size:13px;text-align:right}th:first-child,td:first-child{text-align:left}\
th{text-transform:uppercase;font-size:11px;color:#64748b}tr+tr{border-top:1px solid #eef2f7}\
code{background:#f1f5f9;padding:2px 6px;border-radius:6px}\
.up{color:#059669;font-weight:700}.down{color:#ef4444;font-weight:700}.neutral{color:#374151}.muted{color:#94a3b8}";

/// The dashboard page.
pub fn board_page(
    registry: &Registry,
    quotes: &BTreeMap<String, ResolvedQuote>,
    now: DateTime<FixedOffset>,
    cache_date: Option<NaiveDate>,
) -> String {
    let title = format!("{}!", greeting(now.hour()));
    let stamp = now.format("%A, %d %b %Y %I:%M %p (UTC%:z)").to_string();
    let cache_note = match cache_date {
        Some(date) => format!("Cache date: {date}"),
        None => "Cache missing or not used.".to_string(),
    };

    let mut body = String::new();
    for row in board_rows(registry, quotes) {
        let class = row.direction.css_class();
        body.push_str(&format!(
            "<tr title=\"{source}\"><td>{name}</td><td><code>{ticker}</code></td>\
             <td><strong>{price}</strong></td><td class=\"{class}\">{change}</td>\
             <td class=\"{class}\">{pct}</td><td>{time}</td><td>{low}</td><td>{high}</td></tr>\n",
            source = escape_html(&row.source),
            name = escape_html(&row.display_name),
            ticker = escape_html(&row.ticker),
            price = escape_html(&row.price),
            change = escape_html(&row.change),
            pct = escape_html(&row.change_pct),
            time = escape_html(&row.time),
            low = escape_html(&row.year_low),
            high = escape_html(&row.year_high),
        ));
    }

    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\"><style>{STYLE}</style></head><body>\
<div class=\"card\"><h1>{title}</h1><div class=\"sub\">{stamp}</div><div class=\"sub muted\">{cache_note}</div>\
<table><thead><tr><th>Instrument</th><th>Ticker</th><th>Price</th><th>Change</th><th>%Chg</th>\
<th>Time</th><th>52Wk Low</th><th>52Wk High</th></tr></thead><tbody>\n{body}</tbody></table>\
<div class=\"sub muted\">Source: Yahoo Finance (snapshot, metadata, daily history; cached daily). \
Derived Gold &amp; Silver INR when available.</div></div></body></html>\n",
        title = escape_html(&title),
        stamp = escape_html(&stamp),
        cache_note = escape_html(&cache_note),
    )
}

/// Placeholder page that reloads itself until the board replaces it.
pub fn loading_page(now: DateTime<FixedOffset>, refresh_secs: u32) -> String {
    let opened = now.format("%I:%M:%S %p (UTC%:z)").to_string();
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Loading Market Data...</title>\
<meta http-equiv=\"refresh\" content=\"{refresh_secs}\"><style>{STYLE}</style></head><body>\
<div class=\"card\"><h1>Loading Market Data...</h1>\
<p class=\"sub\">Opened at {opened}. This page refreshes every {refresh_secs}s until data appears.</p>\
<p class=\"muted\">If nothing appears after a while, check fetch.log in the data folder.</p>\
</div></body></html>\n",
        opened = escape_html(&opened),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Instrument;
    use chrono::TimeZone;

    fn resolved(value: f64) -> Resolution {
        Resolution::Resolved {
            value,
            source: SourceTag::Snapshot,
        }
    }

    fn priced(ticker: &str, price: f64) -> ResolvedQuote {
        let mut q = ResolvedQuote::unresolved(ticker, UnresolvedReason::Missing);
        q.price = resolved(price);
        q
    }

    fn morning() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 11, 9, 15, 0)
            .unwrap()
    }

    #[test]
    fn thousands_separators() {
        assert_eq!(format_number(1234567.891, 2).as_deref(), Some("1,234,567.89"));
        assert_eq!(format_number(999.0, 2).as_deref(), Some("999.00"));
        assert_eq!(format_number(-1234.5, 2).as_deref(), Some("-1,234.50"));
        assert_eq!(format_number(-0.001, 2).as_deref(), Some("0.00"));
        assert_eq!(format_number(f64::NAN, 2), None);
    }

    #[test]
    fn suffix_by_ticker_shape() {
        assert_eq!(currency_suffix("TCS.NS"), "₹");
        assert_eq!(currency_suffix("^NSEI"), "₹");
        assert_eq!(currency_suffix("USDINR=X"), "₹");
        assert_eq!(currency_suffix("GC=F-INR"), "₹");
        assert_eq!(currency_suffix("GC=F"), "$");
        assert_eq!(currency_suffix("AAPL"), "$");
    }

    #[test]
    fn all_absent_quote_renders_placeholders() {
        let q = ResolvedQuote::unresolved("TCS.NS", UnresolvedReason::TimedOut);
        let row = row_for("TCS", "TCS.NS", Some(&q));
        assert_eq!(row.price, PRICE_PLACEHOLDER);
        assert_eq!(row.change, VALUE_PLACEHOLDER);
        assert_eq!(row.change_pct, VALUE_PLACEHOLDER);
        assert_eq!(row.year_low, VALUE_PLACEHOLDER);
        assert_eq!(row.year_high, VALUE_PLACEHOLDER);
        assert_eq!(row.direction, Direction::Neutral);

        let missing = row_for("TCS", "TCS.NS", None);
        assert_eq!(missing.price, PRICE_PLACEHOLDER);
    }

    #[test]
    fn row_formats_change_and_direction() {
        let mut q = priced("RELIANCE.NS", 2940.0);
        q.previous_price = resolved(3000.0);
        q.year_high = resolved(3217.9);
        let row = row_for("Reliance", "RELIANCE.NS", Some(&q));
        assert_eq!(row.price, "2,940.00 ₹");
        assert_eq!(row.change, "-60.00");
        assert_eq!(row.change_pct, "-2.00%");
        assert_eq!(row.direction, Direction::Down);
        assert_eq!(row.year_high, "3,217.90 ₹");
    }

    #[test]
    fn derived_rows_need_both_inputs() {
        let mut quotes = BTreeMap::new();
        quotes.insert("GC=F".to_string(), priced("GC=F", 2000.0));
        assert!(derived_quotes(&quotes).is_empty());

        quotes.insert("USDINR=X".to_string(), priced("USDINR=X", 83.0));
        let derived = derived_quotes(&quotes);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].1.ticker, GOLD_INR);
        assert_eq!(derived[0].1.price.source(), Some(SourceTag::Derived));
        assert_eq!(derived[0].1.source_tag, "derived");
        let expected = 2000.0 * 83.0 / 3.11035;
        assert!((derived[0].1.price.value().unwrap() - expected).abs() < 1e-9);

        quotes.insert("SI=F".to_string(), priced("SI=F", 25.0));
        let silver = derived_quotes(&quotes).pop().unwrap().1;
        let expected = 25.0 * 83.0 * (1000.0 / 31.1035);
        assert!((silver.price.value().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn page_renders_with_no_data_in_registry_order() {
        let registry = Registry::new(vec![
            Instrument::new("Zeta <Corp>", "Z"),
            Instrument::new("Alpha", "A"),
        ]);
        let page = board_page(&registry, &BTreeMap::new(), morning(), None);
        assert!(page.contains("Good Morning!"));
        assert!(page.contains("Zeta &lt;Corp&gt;"));
        assert!(page.find("Zeta").unwrap() < page.find("Alpha").unwrap());
        assert!(page.contains(PRICE_PLACEHOLDER));
        assert!(page.contains("Cache missing"));
    }

    #[test]
    fn greeting_by_hour() {
        assert_eq!(greeting(4), "Hello");
        assert_eq!(greeting(5), "Good Morning");
        assert_eq!(greeting(12), "Good Afternoon");
        assert_eq!(greeting(17), "Good Evening");
        assert_eq!(greeting(22), "Hello");
    }

    #[test]
    fn loading_page_refreshes() {
        let page = loading_page(morning(), 3);
        assert!(page.contains("http-equiv=\"refresh\" content=\"3\""));
    }
}
