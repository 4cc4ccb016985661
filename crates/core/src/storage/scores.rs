use crate::storage::ScoreStore;
use anyhow::Context;
use chrono::NaiveDate;

const DEFAULT_UPSERT_BATCH: usize = 200;

#[derive(Debug, Clone)]
pub struct PgScoreStore {
    pool: sqlx::PgPool,
}

impl PgScoreStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ScoreStore for PgScoreStore {
    async fn save(&self, ticker: &str, run_date: NaiveDate, score: f64) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO graham_scores (ticker, run_date, score) VALUES ($1, $2, $3) \
             ON CONFLICT (ticker, run_date) DO UPDATE SET score = EXCLUDED.score",
        )
        .persistent(false)
        .bind(ticker)
        .bind(run_date)
        .bind(score)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert graham_scores failed (ticker={ticker})"))?;
        Ok(())
    }

    async fn save_batch(&self, run_date: NaiveDate, scores: &[(String, f64)]) -> anyhow::Result<u64> {
        if scores.is_empty() {
            return Ok(0);
        }

        let chunk_size: usize = std::env::var("GRAHAM_SCORES_UPSERT_BATCH")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_UPSERT_BATCH);
        anyhow::ensure!(chunk_size >= 1, "GRAHAM_SCORES_UPSERT_BATCH must be >= 1");

        let mut tx = self.pool.begin().await.context("begin transaction failed")?;
        let mut affected: u64 = 0;

        for (batch_idx, chunk) in scores.chunks(chunk_size).enumerate() {
            let t0 = std::time::Instant::now();
            let mut qb = sqlx::QueryBuilder::new("INSERT INTO graham_scores (ticker, run_date, score) ");
            qb.push_values(chunk, |mut b, (ticker, score)| {
                b.push_bind(ticker.as_str()).push_bind(run_date).push_bind(*score);
            });
            qb.push(" ON CONFLICT (ticker, run_date) DO UPDATE SET score = EXCLUDED.score");

            let res = qb
                .build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .context("batch upsert graham_scores failed")?;
            affected += res.rows_affected();

            tracing::debug!(
                %run_date,
                batch_idx,
                batch_size = chunk.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "graham_scores batch upsert"
            );
        }

        tx.commit().await.context("commit transaction failed")?;
        Ok(affected)
    }

    async fn last_score(&self, ticker: &str, before: NaiveDate) -> anyhow::Result<Option<f64>> {
        let row: Option<(f64,)> = sqlx::query_as(
            "SELECT score FROM graham_scores \
             WHERE ticker = $1 AND run_date < $2 \
             ORDER BY run_date DESC \
             LIMIT 1",
        )
        .persistent(false)
        .bind(ticker)
        .bind(before)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select last graham score failed (ticker={ticker})"))?;

        Ok(row.map(|r| r.0))
    }
}
