//! Filter, value, score and rank one universe of snapshots against the
//! score history.

use crate::domain::snapshot::SecuritySnapshot;
use crate::domain::valuation::{self, round2};
use crate::ingest::types::SkippedTicker;
use crate::rates::{RateError, RateProvider};
use crate::storage::ScoreStore;
use anyhow::ensure;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ScreenerOptions {
    pub max_price_to_book: f64,
    pub max_debt_to_equity: f64,
    pub top_n: usize,
    pub margin_of_safety: f64,
    pub reference_yield: f64,
    pub fallback_yield: f64,
}

impl Default for ScreenerOptions {
    fn default() -> Self {
        Self {
            max_price_to_book: 3.0,
            max_debt_to_equity: 100.0,
            top_n: 50,
            margin_of_safety: valuation::DEFAULT_MARGIN_OF_SAFETY,
            reference_yield: valuation::REFERENCE_YIELD,
            fallback_yield: valuation::FALLBACK_YIELD,
        }
    }
}

impl ScreenerOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(v) = env_f64("SCREENER_MAX_PB") {
            out.max_price_to_book = v;
        }
        if let Some(v) = env_f64("SCREENER_MAX_DE") {
            out.max_debt_to_equity = v;
        }
        if let Ok(s) = std::env::var("SCREENER_TOP_N") {
            if let Ok(n) = s.parse::<usize>() {
                out.top_n = n;
            }
        }
        if let Some(v) = env_f64("SCREENER_MARGIN_OF_SAFETY") {
            out.margin_of_safety = v;
        }
        if let Some(v) = env_f64("SCREENER_REFERENCE_YIELD") {
            out.reference_yield = v;
        }
        if let Some(v) = env_f64("SCREENER_FALLBACK_YIELD") {
            out.fallback_yield = v;
        }

        out
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.top_n >= 1, "SCREENER_TOP_N must be >= 1");
        ensure!(
            (0.0..1.0).contains(&self.margin_of_safety),
            "margin of safety must be in [0, 1) (got {})",
            self.margin_of_safety
        );
        ensure!(
            self.fallback_yield.is_finite() && self.fallback_yield > 0.0,
            "fallback yield must be positive (got {})",
            self.fallback_yield
        );
        Ok(())
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// One line of the ranked table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedRow {
    pub ticker: String,
    pub price: f64,
    pub eps: f64,
    pub growth: f64,
    pub pb: Option<f64>,
    pub de: Option<f64>,
    pub intrinsic_value: f64,
    pub score: f64,
    pub buy_under: f64,
    pub actual_mos: f64,
    pub last_score: f64,
    pub score_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldSource {
    Live,
    Fallback,
}

impl YieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            YieldSource::Live => "live",
            YieldSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenerReport {
    pub run_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub current_yield: f64,
    pub yield_source: YieldSource,
    /// Tickers considered, including ones folded in by [`ScreenerReport::with_fetch_skips`].
    pub input_count: usize,
    pub filtered_out: usize,
    pub scored_count: usize,
    pub skipped: Vec<SkippedTicker>,
    pub rows: Vec<RankedRow>,
}

impl ScreenerReport {
    /// Adds tickers dropped before scoring (fetch errors, missing price or eps)
    /// ahead of the pipeline's own skips, so the run ledger lists all of them.
    pub fn with_fetch_skips(mut self, fetch_skipped: Vec<SkippedTicker>) -> Self {
        self.input_count += fetch_skipped.len();
        let mut skipped = fetch_skipped;
        skipped.append(&mut self.skipped);
        self.skipped = skipped;
        self
    }
}

/// Runs one screener pass.
///
/// Per-ticker problems land in `skipped`; a failing rate provider degrades to
/// `fallback_yield`. Score store errors abort the run.
pub async fn run(
    snapshots: Vec<SecuritySnapshot>,
    rates: &dyn RateProvider,
    store: &dyn ScoreStore,
    run_date: NaiveDate,
    opts: &ScreenerOptions,
) -> anyhow::Result<ScreenerReport> {
    opts.validate()?;

    let input_count = snapshots.len();
    tracing::info!(input_count, %run_date, "screener run started");

    let filtered: Vec<SecuritySnapshot> = snapshots
        .into_iter()
        .filter(|s| s.passes_quality_filter(opts.max_price_to_book, opts.max_debt_to_equity))
        .collect();
    let filtered_out = input_count - filtered.len();
    tracing::info!(
        kept = filtered.len(),
        filtered_out,
        max_pb = opts.max_price_to_book,
        max_de = opts.max_debt_to_equity,
        "applied quality filter"
    );

    let (current_yield, yield_source) = resolve_current_yield(rates, opts.fallback_yield).await;

    let mut skipped = Vec::new();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(filtered.len());
    for snapshot in &filtered {
        if !seen.insert(snapshot.ticker.clone()) {
            skipped.push(SkippedTicker::new(&snapshot.ticker, "duplicate ticker in run"));
            continue;
        }

        match score_snapshot(snapshot, current_yield, opts) {
            Ok(row) => rows.push(row),
            Err(err) => {
                tracing::warn!(ticker = %snapshot.ticker, error = %err, "skipping ticker");
                skipped.push(SkippedTicker::new(&snapshot.ticker, format!("{err:#}")));
            }
        }
    }

    for row in rows.iter_mut() {
        let last = store.last_score(&row.ticker, run_date).await?.unwrap_or(0.0);
        row.last_score = round2(last);
        row.score_change = round2(row.score - row.last_score);
    }

    let scores: Vec<(String, f64)> = rows.iter().map(|r| (r.ticker.clone(), r.score)).collect();
    let saved = store.save_batch(run_date, &scores).await?;
    tracing::info!(saved, %run_date, "persisted scores");

    let scored_count = rows.len();
    // `sort_by` is stable; equal scores keep input order.
    rows.sort_by(|a, b| b.score.total_cmp(&a.score));
    rows.truncate(opts.top_n);

    tracing::info!(
        scored_count,
        ranked = rows.len(),
        skipped = skipped.len(),
        current_yield,
        yield_source = yield_source.as_str(),
        "screener run completed"
    );

    Ok(ScreenerReport {
        run_date,
        generated_at: Utc::now(),
        current_yield,
        yield_source,
        input_count,
        filtered_out,
        scored_count,
        skipped,
        rows,
    })
}

async fn resolve_current_yield(rates: &dyn RateProvider, fallback: f64) -> (f64, YieldSource) {
    match rates.current_yield().await {
        Ok(v) => {
            tracing::info!(provider = rates.provider_name(), current_yield = v, "fetched bond yield");
            (v, YieldSource::Live)
        }
        Err(err) => {
            let kind = err.downcast_ref::<RateError>().map(|e| e.kind);
            tracing::warn!(
                provider = rates.provider_name(),
                ?kind,
                error = %err,
                fallback,
                "bond yield unavailable; using fallback"
            );
            (fallback, YieldSource::Fallback)
        }
    }
}

fn score_snapshot(
    snapshot: &SecuritySnapshot,
    current_yield: f64,
    opts: &ScreenerOptions,
) -> anyhow::Result<RankedRow> {
    snapshot.validate()?;

    let intrinsic_value = valuation::intrinsic_value(
        snapshot.trailing_eps,
        snapshot.growth,
        opts.reference_yield,
        current_yield,
    );

    ensure!(snapshot.price > 0.0, "non-positive price ({})", snapshot.price);

    Ok(RankedRow {
        ticker: snapshot.ticker.clone(),
        price: snapshot.price,
        eps: snapshot.trailing_eps,
        growth: snapshot.growth,
        pb: snapshot.price_to_book,
        de: snapshot.debt_to_equity,
        intrinsic_value,
        score: valuation::score(intrinsic_value, snapshot.price),
        buy_under: valuation::buy_under(intrinsic_value, opts.margin_of_safety),
        actual_mos: valuation::actual_margin_of_safety(snapshot.price, intrinsic_value),
        last_score: 0.0,
        score_change: 0.0,
    })
}
