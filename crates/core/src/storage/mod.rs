pub mod lock;
pub mod memory;
pub mod runs;
pub mod scores;

use anyhow::Context;
use chrono::NaiveDate;

pub use memory::MemoryScoreStore;
pub use scores::PgScoreStore;

/// Per-day score ledger keyed by (ticker, run_date).
#[async_trait::async_trait]
pub trait ScoreStore: Send + Sync {
    /// Inserts or replaces the record for (ticker, run_date).
    async fn save(&self, ticker: &str, run_date: NaiveDate, score: f64) -> anyhow::Result<()>;

    /// Upserts all scores for `run_date` atomically. Returns rows affected.
    async fn save_batch(&self, run_date: NaiveDate, scores: &[(String, f64)]) -> anyhow::Result<u64>;

    /// Score of the most recent record dated strictly before `before`.
    async fn last_score(&self, ticker: &str, before: NaiveDate) -> anyhow::Result<Option<f64>>;
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
