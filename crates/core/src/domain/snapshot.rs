use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Value upstream market-data feeds use for "ratio unknown".
pub const RATIO_SENTINEL: f64 = 999.0;

/// One security's attributes for a single screener run.
///
/// Balance-sheet ratios are `None` when the feed did not report them (or
/// reported the sentinel), so the quality filter can exclude them explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySnapshot {
    pub ticker: String,
    pub price: f64,
    pub trailing_eps: f64,
    pub growth: f64,
    pub price_to_book: Option<f64>,
    pub debt_to_equity: Option<f64>,
}

impl SecuritySnapshot {
    /// Builds a snapshot from raw feed values, mapping sentinel ratios to `None`.
    pub fn from_feed(
        ticker: impl Into<String>,
        price: f64,
        trailing_eps: f64,
        growth: f64,
        price_to_book: Option<f64>,
        debt_to_equity: Option<f64>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            trailing_eps,
            growth,
            price_to_book: normalize_ratio(price_to_book),
            debt_to_equity: normalize_ratio(debt_to_equity),
        }
    }

    /// Checks the attributes the valuation needs. Called per row by the pipeline;
    /// failures skip the ticker rather than aborting the run.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.ticker.trim().is_empty(), "ticker must be non-empty");
        ensure!(self.price.is_finite(), "price is not finite ({})", self.price);
        ensure!(
            self.trailing_eps.is_finite(),
            "trailing eps is not finite ({})",
            self.trailing_eps
        );
        ensure!(self.growth.is_finite(), "growth is not finite ({})", self.growth);
        Ok(())
    }

    pub fn passes_quality_filter(&self, max_price_to_book: f64, max_debt_to_equity: f64) -> bool {
        matches!(self.price_to_book, Some(pb) if pb < max_price_to_book)
            && matches!(self.debt_to_equity, Some(de) if de < max_debt_to_equity)
    }
}

pub fn normalize_ratio(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != RATIO_SENTINEL)
}
