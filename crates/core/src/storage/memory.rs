use crate::storage::ScoreStore;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Process-local score ledger, used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    records: Mutex<BTreeMap<(String, NaiveDate), f64>>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn get(&self, ticker: &str, run_date: NaiveDate) -> Option<f64> {
        self.records
            .lock()
            .await
            .get(&(ticker.to_string(), run_date))
            .copied()
    }
}

#[async_trait::async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn save(&self, ticker: &str, run_date: NaiveDate, score: f64) -> anyhow::Result<()> {
        self.records
            .lock()
            .await
            .insert((ticker.to_string(), run_date), score);
        Ok(())
    }

    async fn save_batch(&self, run_date: NaiveDate, scores: &[(String, f64)]) -> anyhow::Result<u64> {
        let mut guard = self.records.lock().await;
        for (ticker, score) in scores {
            guard.insert((ticker.clone(), run_date), *score);
        }
        Ok(scores.len() as u64)
    }

    async fn last_score(&self, ticker: &str, before: NaiveDate) -> anyhow::Result<Option<f64>> {
        let guard = self.records.lock().await;
        let lo = (ticker.to_string(), NaiveDate::MIN);
        let hi = (ticker.to_string(), before);
        Ok(guard.range(lo..hi).next_back().map(|(_, score)| *score))
    }
}
