use anyhow::Context;
use clap::Parser;
use graham_core::ingest::collect::CollectOptions;
use graham_core::pipeline::{ScreenerOptions, ScreenerReport};
use graham_core::rates::cache::FileYieldCache;
use graham_core::rates::fred::FredRateProvider;
use graham_core::storage::lock::RunDateLock;
use graham_core::storage::{MemoryScoreStore, PgScoreStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod universe;

#[derive(Debug, Parser)]
#[command(name = "graham_worker")]
struct Args {
    /// Run date (YYYY-MM-DD) the scores are recorded under. Defaults to today.
    #[arg(long)]
    run_date: Option<String>,

    /// Score against an in-memory ledger; nothing is written to the database.
    #[arg(long)]
    dry_run: bool,

    /// Comma-separated tickers to screen instead of the provider's list.
    #[arg(long)]
    tickers: Option<String>,

    /// Only fetch the first N tickers of the universe.
    #[arg(long)]
    max_tickers: Option<usize>,

    /// Print the ranked-table column definitions and exit.
    #[arg(long)]
    explain_columns: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = graham_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if args.explain_columns {
        print!("{}", graham_core::domain::columns::render_help());
        return Ok(());
    }

    let run_date = graham_core::time::run_date::resolve_run_date(args.run_date.as_deref(), chrono::Utc::now())?;

    // Configuration errors abort before any data is fetched.
    let cache_dir = settings
        .yield_cache_path
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(FileYieldCache::default_dir);
    let rates = FredRateProvider::from_settings(&settings, Arc::new(FileYieldCache::new(cache_dir)))?;
    let source = graham_core::ingest::HttpJsonDataSource::from_settings(&settings)?;
    let screener_opts = ScreenerOptions::from_env();
    screener_opts.validate()?;

    let mut universe_opts = universe::UniverseOptions::from_env();
    if let Some(s) = args.tickers.as_deref() {
        universe_opts.tickers = universe::parse_ticker_list(s);
    }
    if args.max_tickers.is_some() {
        universe_opts.max_tickers = args.max_tickers;
    }

    let tickers = universe::resolve_universe(&source, &universe_opts).await?;
    tracing::info!(%run_date, tickers = tickers.len(), dry_run = args.dry_run, "fetching snapshots");

    let collected =
        graham_core::ingest::collect_snapshots(&source, &tickers, &CollectOptions::from_env()).await;
    for skipped in &collected.skipped {
        tracing::warn!(ticker = %skipped.ticker, reason = %skipped.reason, "ticker not screened");
    }

    if args.dry_run {
        let store = MemoryScoreStore::new();
        let report =
            graham_core::pipeline::run(collected.snapshots, &rates, &store, run_date, &screener_opts)
                .await?
                .with_fetch_skips(collected.skipped);
        return emit(&report);
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    graham_core::storage::migrate(&pool).await?;

    let Some(lock) = RunDateLock::try_acquire(&pool, run_date).await? else {
        tracing::warn!(%run_date, "run_date lock not acquired; another run in progress");
        return Ok(());
    };

    let store = PgScoreStore::new(pool.clone());
    let result =
        graham_core::pipeline::run(collected.snapshots, &rates, &store, run_date, &screener_opts).await;

    let outcome = match result {
        Ok(report) => {
            let report = report.with_fetch_skips(collected.skipped);
            let run_id = graham_core::storage::runs::record_run_success(&pool, &report).await?;
            tracing::info!(%run_date, %run_id, ranked = report.rows.len(), "recorded screener run");
            emit(&report)
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            let run_id = graham_core::storage::runs::record_run_failure(
                &pool,
                run_date,
                chrono::Utc::now(),
                &format!("{:#}", err),
            )
            .await?;
            tracing::error!(%run_date, %run_id, error = %err, "screener run failed");
            Err(err)
        }
    };

    match lock.release().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(%run_date, "run_date lock was not held at release"),
        Err(err) => tracing::error!(%run_date, error = %err, "failed to release run_date lock"),
    }
    outcome
}

/// Ranked rows go to stdout as JSON; logs stay on stderr.
fn emit(report: &ScreenerReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&report.rows).context("serialize ranked rows failed")?;
    println!("{json}");

    tracing::info!(
        run_date = %report.run_date,
        input = report.input_count,
        filtered_out = report.filtered_out,
        scored = report.scored_count,
        ranked = report.rows.len(),
        skipped = report.skipped.len(),
        current_yield = report.current_yield,
        yield_source = report.yield_source.as_str(),
        "screener summary"
    );
    Ok(())
}

fn init_sentry(settings: &graham_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
