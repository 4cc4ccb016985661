use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LEGACY_TTL_SECS: u64 = 24 * 3600;

/// Small key/value cache for macro figures that change at most daily.
#[async_trait::async_trait]
pub trait YieldCache: Send + Sync {
    /// Returns the cached value if present and not older than its TTL.
    async fn get(&self, key: &str) -> anyhow::Result<Option<f64>>;

    async fn set(&self, key: &str, value: f64, ttl: Duration) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Seconds since the Unix epoch at write time.
    pub timestamp: f64,
    pub value: f64,
    // Records written without a TTL are treated as daily.
    #[serde(default = "legacy_ttl")]
    pub ttl_secs: u64,
}

fn legacy_ttl() -> u64 {
    LEGACY_TTL_SECS
}

impl CacheRecord {
    pub fn new(value: f64, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: epoch_secs(now),
            value,
            ttl_secs: ttl.as_secs(),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = epoch_secs(now) - self.timestamp;
        age >= 0.0 && age < self.ttl_secs as f64
    }
}

fn epoch_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

/// One JSON file per key under a cache directory.
#[derive(Debug, Clone)]
pub struct FileYieldCache {
    dir: PathBuf,
}

impl FileYieldCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$HOME/.cache/graham_screener`, or the current directory when HOME is unset.
    pub fn default_dir() -> PathBuf {
        match std::env::var("HOME") {
            Ok(home) if !home.trim().is_empty() => {
                Path::new(&home).join(".cache").join("graham_screener")
            }
            _ => PathBuf::from(".cache"),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

#[async_trait::async_trait]
impl YieldCache for FileYieldCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<f64>> {
        let path = self.path_for(key);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read cache file {}", path.display()))
            }
        };

        let record = match serde_json::from_str::<CacheRecord>(&text) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt yield cache file");
                return Ok(None);
            }
        };

        Ok(record.is_fresh(Utc::now()).then_some(record.value))
    }

    async fn set(&self, key: &str, value: f64, ttl: Duration) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create cache dir {}", self.dir.display()))?;

        let path = self.path_for(key);
        let record = CacheRecord::new(value, ttl, Utc::now());
        let json = serde_json::to_string(&record).context("serialize cache record failed")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("write cache file {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryYieldCache {
    records: std::sync::Mutex<HashMap<String, CacheRecord>>,
}

impl MemoryYieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record with an explicit write time.
    pub fn insert_record(&self, key: &str, record: CacheRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.insert(key.to_string(), record);
        }
    }
}

#[async_trait::async_trait]
impl YieldCache for MemoryYieldCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<f64>> {
        let guard = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("yield cache mutex poisoned"))?;
        Ok(guard
            .get(key)
            .filter(|r| r.is_fresh(Utc::now()))
            .map(|r| r.value))
    }

    async fn set(&self, key: &str, value: f64, ttl: Duration) -> anyhow::Result<()> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("yield cache mutex poisoned"))?;
        guard.insert(key.to_string(), CacheRecord::new(value, ttl, Utc::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    #[tokio::test]
    async fn file_cache_round_trips_fresh_value() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileYieldCache::new(dir.path());

        assert_eq!(cache.get("aaa_yield").await.unwrap(), None);
        cache.set("aaa_yield", 5.31, DAY).await.unwrap();
        assert_eq!(cache.get("aaa_yield").await.unwrap(), Some(5.31));
    }

    #[tokio::test]
    async fn file_cache_ignores_stale_and_reads_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileYieldCache::new(dir.path());

        let stale = Utc::now() - chrono::Duration::hours(25);
        let json = format!(r#"{{"timestamp": {}, "value": 5.0}}"#, stale.timestamp());
        std::fs::write(dir.path().join("aaa_yield.json"), json).unwrap();
        assert_eq!(cache.get("aaa_yield").await.unwrap(), None);

        let fresh = Utc::now() - chrono::Duration::hours(1);
        let json = format!(r#"{{"timestamp": {}, "value": 5.5}}"#, fresh.timestamp());
        std::fs::write(dir.path().join("aaa_yield.json"), json).unwrap();
        assert_eq!(cache.get("aaa_yield").await.unwrap(), Some(5.5));
    }

    #[tokio::test]
    async fn file_cache_treats_corrupt_file_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aaa_yield.json"), "not json").unwrap();
        let cache = FileYieldCache::new(dir.path());
        assert_eq!(cache.get("aaa_yield").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_expires_by_ttl() {
        let cache = MemoryYieldCache::new();
        let old = Utc::now() - chrono::Duration::seconds(120);
        cache.insert_record("k", CacheRecord::new(4.2, Duration::from_secs(60), old));
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", 4.3, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(4.3));
    }
}
