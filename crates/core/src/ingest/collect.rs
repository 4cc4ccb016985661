use crate::domain::snapshot::SecuritySnapshot;
use crate::ingest::provider::FinancialDataSource;
use crate::ingest::types::SkippedTicker;
use std::time::Duration;

const DEFAULT_REQ_DELAY_MS: u64 = 1000;
const MAX_LOGGED_FAILURES: usize = 10;

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Pause between consecutive tickers. Courtesy pacing, not a rate limiter.
    pub req_delay: Duration,
    pub progress_every: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            req_delay: Duration::from_millis(DEFAULT_REQ_DELAY_MS),
            progress_every: 50,
        }
    }
}

impl CollectOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Some(ms) = std::env::var("DATA_PROVIDER_REQ_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            out.req_delay = Duration::from_millis(ms);
        }

        if let Some(n) = std::env::var("DATA_PROVIDER_PROGRESS_EVERY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            out.progress_every = n;
        }

        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub snapshots: Vec<SecuritySnapshot>,
    pub skipped: Vec<SkippedTicker>,
}

/// Fetches one snapshot per ticker, sequentially. Fetch errors and unavailable
/// tickers are recorded in `skipped`; nothing here aborts the batch.
pub async fn collect_snapshots(
    source: &dyn FinancialDataSource,
    tickers: &[String],
    opts: &CollectOptions,
) -> Collected {
    let mut out = Collected::default();
    let total = tickers.len();
    let mut logged_failures: usize = 0;

    for (idx, ticker) in tickers.iter().enumerate() {
        if idx != 0 && !opts.req_delay.is_zero() {
            tokio::time::sleep(opts.req_delay).await;
        }

        match source.fetch_snapshot(ticker).await {
            Ok(Some(snapshot)) => out.snapshots.push(snapshot),
            Ok(None) => {
                out.skipped
                    .push(SkippedTicker::new(ticker, "price or eps unavailable"));
            }
            Err(err) => {
                if logged_failures < MAX_LOGGED_FAILURES {
                    tracing::warn!(
                        idx,
                        %ticker,
                        provider = source.provider_name(),
                        error = %err,
                        "snapshot fetch failed; skipping ticker"
                    );
                    logged_failures += 1;
                }
                out.skipped.push(SkippedTicker::new(ticker, format!("{err:#}")));
            }
        }

        if opts.progress_every != 0 {
            let n = idx + 1;
            if n == 1 || n == total || n % opts.progress_every == 0 {
                tracing::info!(
                    processed = n,
                    total,
                    snapshots = out.snapshots.len(),
                    skipped = out.skipped.len(),
                    "snapshot collection progress"
                );
            }
        }
    }

    out
}
