use crate::pipeline::ScreenerReport;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

pub async fn record_run_success(pool: &sqlx::PgPool, report: &ScreenerReport) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let skipped = serde_json::to_value(&report.skipped).context("serialize skipped tickers failed")?;

    sqlx::query(
        "INSERT INTO screener_runs \
         (id, run_date, generated_at, status, current_yield, yield_source, input_count, ranked_count, skipped, error) \
         VALUES ($1, $2, $3, 'success', $4, $5, $6, $7, $8, NULL)",
    )
    .persistent(false)
    .bind(id)
    .bind(report.run_date)
    .bind(report.generated_at)
    .bind(report.current_yield)
    .bind(report.yield_source.as_str())
    .bind(report.input_count as i32)
    .bind(report.rows.len() as i32)
    .bind(skipped)
    .execute(pool)
    .await
    .context("insert screener_runs failed")?;

    Ok(id)
}

pub async fn record_run_failure(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
    generated_at: DateTime<Utc>,
    error: &str,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO screener_runs (id, run_date, generated_at, status, error) \
         VALUES ($1, $2, $3, 'error', $4)",
    )
    .persistent(false)
    .bind(id)
    .bind(run_date)
    .bind(generated_at)
    .bind(error)
    .execute(pool)
    .await
    .context("insert error screener_runs failed")?;

    Ok(id)
}
