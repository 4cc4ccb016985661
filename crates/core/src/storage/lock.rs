use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks belong to the Postgres session that took them, so the lock
// pins one pooled connection for its whole lifetime and unlocks on that same
// connection.
const LOCK_NAMESPACE: i64 = 0x4752_4148_414D; // "GRAHAM"

fn lock_key_for_date(run_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (run_date.num_days_from_ce() as i64)
}

/// Exclusive claim on one run date's score writes.
///
/// Dropping it without [`RunDateLock::release`] detaches the connection from the
/// pool, which ends the session and frees the lock server-side.
pub struct RunDateLock {
    conn: Option<PoolConnection<Postgres>>,
    run_date: NaiveDate,
    key: i64,
}

impl RunDateLock {
    /// `Ok(None)` when another session already holds the lock for `run_date`.
    pub async fn try_acquire(pool: &sqlx::PgPool, run_date: NaiveDate) -> anyhow::Result<Option<Self>> {
        let key = lock_key_for_date(run_date);
        let mut conn = pool
            .acquire()
            .await
            .context("failed to check out lock connection")?;

        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

        if !acquired.0 {
            return Ok(None);
        }

        tracing::debug!(%run_date, key, "acquired run_date lock");
        Ok(Some(Self {
            conn: Some(conn),
            run_date,
            key,
        }))
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }

    /// Unlocks on the session that locked. Returns Postgres' verdict; `false`
    /// means the session no longer held the lock.
    pub async fn release(mut self) -> anyhow::Result<bool> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(false);
        };

        let key = self.key;
        let released: (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;

        if !released.0 {
            tracing::warn!(run_date = %self.run_date, key, "advisory unlock returned false; lock was not held");
        }
        Ok(released.0)
    }
}

impl Drop for RunDateLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(run_date = %self.run_date, key = self.key, "run_date lock dropped without release; closing its session");
            drop(conn.detach());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_differ_per_date() {
        let a = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let b = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_ne!(lock_key_for_date(a), lock_key_for_date(b));
        assert_eq!(lock_key_for_date(a), lock_key_for_date(a));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a scratch Postgres"]
    async fn lock_is_exclusive_and_released_on_its_own_session() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let held = RunDateLock::try_acquire(&pool, date).await.unwrap().unwrap();
        assert!(RunDateLock::try_acquire(&pool, date).await.unwrap().is_none());

        assert!(held.release().await.unwrap());

        let again = RunDateLock::try_acquire(&pool, date).await.unwrap().unwrap();
        assert!(again.release().await.unwrap());
    }
}
