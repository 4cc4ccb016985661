use graham_core::ingest::provider::normalize_ticker;
use graham_core::ingest::FinancialDataSource;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct UniverseOptions {
    /// Explicit tickers; when empty the data source's list is used.
    pub tickers: Vec<String>,

    /// Cap on the number of tickers fetched (useful for smoke runs).
    pub max_tickers: Option<usize>,
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("UNIVERSE_TICKERS") {
            out.tickers = parse_ticker_list(&s);
        }

        if let Ok(s) = std::env::var("UNIVERSE_MAX_TICKERS") {
            if let Ok(n) = s.parse::<usize>() {
                out.max_tickers = Some(n);
            }
        }

        out
    }
}

pub fn parse_ticker_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(normalize_ticker)
        .filter(|t| !t.is_empty())
        .collect()
}

pub async fn resolve_universe(
    source: &dyn FinancialDataSource,
    opts: &UniverseOptions,
) -> anyhow::Result<Vec<String>> {
    let tickers = if opts.tickers.is_empty() {
        source.fetch_tickers().await?
    } else {
        opts.tickers.clone()
    };

    let mut out = dedupe_preserving_order(tickers);
    if let Some(max) = opts.max_tickers {
        out.truncate(max);
    }

    anyhow::ensure!(!out.is_empty(), "ticker universe is empty");
    Ok(out)
}

fn dedupe_preserving_order(tickers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers.into_iter().filter(|t| seen.insert(t.clone())).collect()
}
