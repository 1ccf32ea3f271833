//! Symbol registry: ordered display-name → ticker mapping.
//!
//! Registry order is the display order of the board. Resolution results are
//! keyed by ticker and carry no order of their own.

use serde::{Deserialize, Serialize};

/// One board instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(rename = "name")]
    pub display_name: String,
    pub ticker: String,
}

impl Instrument {
    pub fn new(display_name: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ticker: ticker.into(),
        }
    }
}

/// Immutable, ordered set of instruments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    instruments: Vec<Instrument>,
}

impl Registry {
    /// Build a registry. Later entries whose ticker repeats an earlier one are dropped.
    pub fn new(instruments: Vec<Instrument>) -> Self {
        let mut kept: Vec<Instrument> = Vec::with_capacity(instruments.len());
        for inst in instruments {
            if !kept.iter().any(|k| k.ticker == inst.ticker) {
                kept.push(inst);
            }
        }
        Self { instruments: kept }
    }

    /// Indian indices and large caps, FX, crypto and commodities.
    pub fn default_board() -> Self {
        Self::new(default_instruments())
    }

    /// NIFTY 50 constituents, named by their NSE symbol.
    pub fn nifty50() -> Self {
        Self::new(nifty50_instruments())
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn tickers(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.ticker.clone()).collect()
    }

    pub fn display_name(&self, ticker: &str) -> Option<&str> {
        self.instruments
            .iter()
            .find(|i| i.ticker == ticker)
            .map(|i| i.display_name.as_str())
    }

    /// Look up by ticker or display name, case-insensitive.
    pub fn find(&self, query: &str) -> Option<&Instrument> {
        let query = query.trim();
        self.instruments.iter().find(|i| {
            i.ticker.eq_ignore_ascii_case(query) || i.display_name.eq_ignore_ascii_case(query)
        })
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::default_board()
    }
}

pub fn default_instruments() -> Vec<Instrument> {
    [
        ("Sensex", "^BSESN"),
        ("NIFTY", "^NSEI"),
        ("Paradeep", "PARADEEP.NS"),
        ("DMart", "DMART.NS"),
        ("Reliance Industries", "RELIANCE.NS"),
        ("TCS", "TCS.NS"),
        ("HDFC Bank", "HDFCBANK.NS"),
        ("SBI", "SBIN.NS"),
        ("ITC", "ITC.NS"),
        ("Tata Motors", "TATAMOTORS.NS"),
        ("Nestle India", "NESTLEIND.NS"),
        ("USD → INR", "USDINR=X"),
        ("Bitcoin (USD)", "BTC-USD"),
        ("Brent (USD/bbl)", "BZ=F"),
        ("Gold (USD/oz)", "GC=F"),
        ("Silver (USD/oz)", "SI=F"),
    ]
    .into_iter()
    .map(|(name, ticker)| Instrument::new(name, ticker))
    .collect()
}

const NIFTY50_TICKERS: [&str; 48] = [
    "RELIANCE.NS", "TCS.NS", "HDFCBANK.NS", "INFY.NS", "HINDUNILVR.NS", "ICICIBANK.NS",
    "KOTAKBANK.NS", "SBIN.NS", "LT.NS", "AXISBANK.NS", "ITC.NS", "BHARTIARTL.NS",
    "HDFC.NS", "MARUTI.NS", "ASIANPAINT.NS", "HCLTECH.NS", "NESTLEIND.NS", "SUNPHARMA.NS",
    "BAJFINANCE.NS", "BAJAJ-AUTO.NS", "BAJAJFINSV.NS", "ULTRACEMCO.NS", "ONGC.NS", "POWERGRID.NS",
    "NTPC.NS", "TITAN.NS", "TATASTEEL.NS", "TECHM.NS", "WIPRO.NS", "SBILIFE.NS",
    "DIVISLAB.NS", "GRASIM.NS", "IOC.NS", "INDUSINDBK.NS", "BRITANNIA.NS", "COALINDIA.NS",
    "HDFCLIFE.NS", "DRREDDY.NS", "JSWSTEEL.NS", "BPCL.NS", "EICHERMOT.NS", "ADANIENT.NS",
    "ADANIPORTS.NS", "APOLLOHOSP.NS", "BHARATFORG.NS", "CIPLA.NS", "HINDALCO.NS", "M&M.NS",
];

/// Static NIFTY 50 component list. The display name is the ticker without
/// its `.NS` exchange suffix.
pub fn nifty50_instruments() -> Vec<Instrument> {
    NIFTY50_TICKERS
        .into_iter()
        .map(|ticker| {
            let name = ticker.strip_suffix(".NS").unwrap_or(ticker);
            Instrument::new(name, ticker)
        })
        .collect()
}
