//! Yahoo Finance quote provider.
//!
//! - snapshot: v8 chart endpoint over one day, `chart.result[0].meta`
//! - metadata: v7 quote endpoint, `quoteResponse.result[0]`
//! - history: v8 chart endpoint over one or two years of daily bars
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; field names drift between symbol types, which is why both field
//! sets are returned raw and normalised by the resolver. This provider makes
//! one request per call; retries and backoff belong to the resolver.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DailyBar, Lookback, ProviderError, QuoteProvider, RawFields};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const CHART_BASE: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const QUOTE_BASE: &str = "https://query1.finance.yahoo.com/v7/finance/quote";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: RawFields,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Yahoo Finance v7 quote API response.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResult,
}

#[derive(Debug, Deserialize)]
struct QuoteResult {
    result: Option<Vec<RawFields>>,
    error: Option<ApiError>,
}

fn api_error(ticker: &str, err: Option<ApiError>) -> ProviderError {
    match err {
        Some(err) if err.code == "Not Found" => ProviderError::SymbolNotFound {
            symbol: ticker.to_string(),
        },
        Some(err) => ProviderError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => ProviderError::ResponseFormatChanged("empty result with no error".into()),
    }
}

fn first_chart(ticker: &str, resp: ChartResponse) -> Result<ChartData, ProviderError> {
    let ChartResult { result, error } = resp.chart;
    result
        .ok_or_else(|| api_error(ticker, error))?
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormatChanged("result array is empty".into()))
}

fn parse_snapshot(ticker: &str, resp: ChartResponse) -> Result<RawFields, ProviderError> {
    Ok(first_chart(ticker, resp)?.meta)
}

fn parse_metadata(ticker: &str, resp: QuoteResponse) -> Result<RawFields, ProviderError> {
    let QuoteResult { result, error } = resp.quote_response;
    result
        .ok_or_else(|| api_error(ticker, error))?
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::SymbolNotFound {
            symbol: ticker.to_string(),
        })
}

/// Daily bars oldest first. Rows with no high, low and close are dropped;
/// an empty vector is a valid answer.
fn parse_history(ticker: &str, resp: ChartResponse) -> Result<Vec<DailyBar>, ProviderError> {
    let data = first_chart(ticker, resp)?;
    let timestamps = data.timestamp.unwrap_or_default();
    let columns = data
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.naive_utc().date())
            .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;

        let high = columns.high.get(i).copied().flatten();
        let low = columns.low.get(i).copied().flatten();
        let close = columns.close.get(i).copied().flatten();

        // Holidays come back as all-null rows
        if high.is_none() && low.is_none() && close.is_none() {
            continue;
        }

        bars.push(DailyBar {
            date,
            high: high.unwrap_or(f64::NAN),
            low: low.unwrap_or(f64::NAN),
            close: close.unwrap_or(f64::NAN),
        });
    }

    Ok(bars)
}

/// Yahoo Finance quote provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
        })
    }

    fn chart_url(ticker: &str, range: &str) -> Result<Url, ProviderError> {
        let mut url = Url::parse(CHART_BASE)
            .map_err(|e| ProviderError::Other(format!("invalid chart base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Other("chart base url cannot take a path".into()))?
            .push(ticker);
        url.query_pairs_mut()
            .append_pair("range", range)
            .append_pair("interval", "1d")
            .append_pair("includePrePost", "false");
        Ok(url)
    }

    fn quote_url(ticker: &str) -> Result<Url, ProviderError> {
        Url::parse_with_params(QUOTE_BASE, &[("symbols", ticker)])
            .map_err(|e| ProviderError::Other(format!("invalid quote base url: {e}")))
    }

    /// Execute one GET and decode the JSON body, feeding the circuit breaker.
    fn get_json<T: DeserializeOwned>(&self, url: Url, ticker: &str) -> Result<T, ProviderError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped);
        }

        log::debug!("GET {url}");
        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                self.circuit_breaker.record_failure();
            }
            ProviderError::NetworkUnreachable(e.to_string())
        })?;

        let status = resp.status();

        if status == reqwest::StatusCode::FORBIDDEN {
            // IP ban
            self.circuit_breaker.trip();
            return Err(ProviderError::CircuitBreakerTripped);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }

        if !status.is_success() {
            self.circuit_breaker.record_failure();
            return Err(ProviderError::Other(format!("HTTP {status} for {ticker}")));
        }

        let body = resp.json::<T>().map_err(|e| {
            ProviderError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
        })?;
        self.circuit_breaker.record_success();
        Ok(body)
    }
}

impl QuoteProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn snapshot(&self, ticker: &str) -> Result<RawFields, ProviderError> {
        let resp: ChartResponse = self.get_json(Self::chart_url(ticker, "1d")?, ticker)?;
        parse_snapshot(ticker, resp)
    }

    fn metadata(&self, ticker: &str) -> Result<RawFields, ProviderError> {
        let resp: QuoteResponse = self.get_json(Self::quote_url(ticker)?, ticker)?;
        parse_metadata(ticker, resp)
    }

    fn history(&self, ticker: &str, lookback: Lookback) -> Result<Vec<DailyBar>, ProviderError> {
        let url = Self::chart_url(ticker, lookback.range_param())?;
        let resp: ChartResponse = self.get_json(url, ticker)?;
        parse_history(ticker, resp)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(json: &str) -> ChartResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn urls_carry_ticker_as_one_segment() {
        let url = YahooProvider::chart_url("^BSESN", "1y").unwrap();
        assert!(url.as_str().starts_with(CHART_BASE));
        assert_eq!(url.path_segments().and_then(|s| s.last()), Some("^BSESN"));
        assert!(url.as_str().contains("range=1y"));

        let url = YahooProvider::quote_url("M&M.NS").unwrap();
        assert!(url.as_str().ends_with("symbols=M%26M.NS"));
    }

    #[test]
    fn snapshot_returns_meta_fields() {
        let resp = chart(
            r#"{"chart":{"result":[{"meta":{"regularMarketPrice":105.5,"chartPreviousClose":100.0}}],"error":null}}"#,
        );
        let meta = parse_snapshot("TCS.NS", resp).unwrap();
        assert_eq!(meta["regularMarketPrice"], serde_json::json!(105.5));
    }

    #[test]
    fn not_found_maps_to_symbol_error() {
        let resp = chart(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#,
        );
        match parse_snapshot("NOPE", resp) {
            Err(ProviderError::SymbolNotFound { symbol }) => assert_eq!(symbol, "NOPE"),
            other => panic!("expected SymbolNotFound, got {other:?}"),
        }
    }

    #[test]
    fn history_skips_all_null_rows() {
        let resp = chart(
            r#"{"chart":{"result":[{"meta":{},
                "timestamp":[1704153600,1704240000,1704326400],
                "indicators":{"quote":[{"high":[10.0,null,15.0],"low":[5.0,null,null],"close":[7.0,null,12.0]}]}}],
                "error":null}}"#,
        );
        let bars = parse_history("X", resp).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].high, 10.0);
        assert!(bars[1].low.is_nan());
        assert_eq!(bars[1].close, 12.0);
    }

    #[test]
    fn history_without_timestamps_is_empty() {
        let resp = chart(r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#);
        assert!(parse_history("X", resp).unwrap().is_empty());
    }

    #[test]
    fn metadata_takes_first_result() {
        let resp: QuoteResponse = serde_json::from_str(
            r#"{"quoteResponse":{"result":[{"symbol":"GC=F","fiftyTwoWeekHigh":2100.5}],"error":null}}"#,
        )
        .unwrap();
        let fields = parse_metadata("GC=F", resp).unwrap();
        assert_eq!(fields["symbol"], serde_json::json!("GC=F"));

        let empty: QuoteResponse =
            serde_json::from_str(r#"{"quoteResponse":{"result":[],"error":null}}"#).unwrap();
        assert!(matches!(
            parse_metadata("GC=F", empty),
            Err(ProviderError::SymbolNotFound { .. })
        ));
    }
}
