use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickersResponse {
    pub tickers: Vec<String>,
}

/// Quote fundamentals as reported by the market-data feed. Any field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub trailing_eps: Option<f64>,
    #[serde(default)]
    pub price_to_book: Option<f64>,
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
}

/// Analyst growth estimates keyed by period label ("Current qtr.", "Current year", ...),
/// values as percent strings such as `"5.20%"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrowthResponse {
    #[serde(default)]
    pub estimates: BTreeMap<String, String>,
}

pub const CURRENT_YEAR_ESTIMATE: &str = "Current year";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: String,
}

impl SkippedTicker {
    pub fn new(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }
}
