use crate::config::Settings;
use crate::rates::cache::YieldCache;
use crate::rates::{RateError, RateErrorKind, RateProvider};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org";
const OBSERVATIONS_PATH: &str = "/fred/series/observations";
const DEFAULT_SERIES_ID: &str = "AAA";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(default)]
    date: Option<String>,
    value: String,
}

/// Latest Moody's AAA corporate bond yield from the St. Louis Fed (FRED),
/// cached for a day.
pub struct FredRateProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    series_id: String,
    cache: Arc<dyn YieldCache>,
}

impl FredRateProvider {
    /// Fails when `FRED_API_KEY` is missing; the run must not start without it.
    pub fn from_settings(settings: &Settings, cache: Arc<dyn YieldCache>) -> Result<Self> {
        let api_key = settings.require_fred_api_key()?.to_string();
        let base_url = settings
            .fred_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let series_id = std::env::var("FRED_SERIES_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERIES_ID.to_string());

        Self::new(base_url, api_key, series_id, cache)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        series_id: impl Into<String>,
        cache: Arc<dyn YieldCache>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build FRED http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            series_id: series_id.into(),
            cache,
        })
    }

    fn cache_key(&self) -> String {
        format!("fred_{}_yield", self.series_id.to_ascii_lowercase())
    }

    async fn fetch_latest(&self) -> Result<f64> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), OBSERVATIONS_PATH);

        let res = self
            .http
            .get(url)
            .query(&[
                ("series_id", self.series_id.as_str()),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| RateError::new(RateErrorKind::Http, format!("FRED request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            return Err(RateError::new(RateErrorKind::Http, format!("FRED HTTP {status}")).into());
        }

        let body = res.json::<ObservationsResponse>().await.map_err(|e| {
            RateError::new(RateErrorKind::Http, format!("FRED response is not valid JSON: {e}"))
        })?;

        parse_latest(body)
    }
}

fn parse_latest(body: ObservationsResponse) -> Result<f64> {
    let latest = body.observations.into_iter().next().ok_or_else(|| {
        RateError::new(RateErrorKind::NoObservations, "no observations returned from FRED")
    })?;

    let value = latest.value.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    match value {
        Some(v) => {
            tracing::debug!(date = latest.date.as_deref().unwrap_or("?"), value = v, "FRED observation");
            Ok(v)
        }
        None => Err(RateError::new(
            RateErrorKind::InvalidValue,
            format!("invalid yield value received: {}", latest.value),
        )
        .into()),
    }
}

#[async_trait::async_trait]
impl RateProvider for FredRateProvider {
    fn provider_name(&self) -> &'static str {
        "fred"
    }

    async fn current_yield(&self) -> Result<f64> {
        let key = self.cache_key();
        match self.cache.get(&key).await {
            Ok(Some(v)) => {
                tracing::debug!(%key, value = v, "yield cache hit");
                return Ok(v);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(%key, error = %err, "yield cache read failed; fetching"),
        }

        let value = self.fetch_latest().await?;

        if let Err(err) = self.cache.set(&key, value, CACHE_TTL).await {
            tracing::warn!(%key, error = %err, "yield cache write failed");
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::cache::MemoryYieldCache;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, cache: Arc<MemoryYieldCache>) -> FredRateProvider {
        FredRateProvider::new(server.uri(), "test-key", "AAA", cache).unwrap()
    }

    #[tokio::test]
    async fn fetches_latest_and_caches_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OBSERVATIONS_PATH))
            .and(query_param("series_id", "AAA"))
            .and(query_param("api_key", "test-key"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "observations": [{"date": "2026-10-15", "value": "5.31"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryYieldCache::new());
        let p = provider(&server, cache.clone());

        assert_eq!(p.current_yield().await.unwrap(), 5.31);
        // Second call is served from the cache; the mock expects a single request.
        assert_eq!(p.current_yield().await.unwrap(), 5.31);
        assert_eq!(cache.get("fred_aaa_yield").await.unwrap(), Some(5.31));
    }

    #[tokio::test]
    async fn empty_observations_is_a_distinct_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OBSERVATIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"observations": []})))
            .mount(&server)
            .await;

        let err = provider(&server, Arc::new(MemoryYieldCache::new()))
            .current_yield()
            .await
            .unwrap_err();
        let rate = err.downcast_ref::<RateError>().unwrap();
        assert_eq!(rate.kind, RateErrorKind::NoObservations);
    }

    #[tokio::test]
    async fn non_numeric_value_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OBSERVATIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "observations": [{"date": "2026-10-15", "value": "."}]
            })))
            .mount(&server)
            .await;

        let err = provider(&server, Arc::new(MemoryYieldCache::new()))
            .current_yield()
            .await
            .unwrap_err();
        let rate = err.downcast_ref::<RateError>().unwrap();
        assert_eq!(rate.kind, RateErrorKind::InvalidValue);
    }

    #[tokio::test]
    async fn http_failure_is_reported_and_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OBSERVATIONS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryYieldCache::new());
        let err = provider(&server, cache.clone()).current_yield().await.unwrap_err();
        assert_eq!(err.downcast_ref::<RateError>().unwrap().kind, RateErrorKind::Http);
        assert_eq!(cache.get("fred_aaa_yield").await.unwrap(), None);
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let settings = Settings {
            database_url: None,
            fred_api_key: None,
            fred_base_url: None,
            yield_cache_path: None,
            sentry_dsn: None,
            data_provider_base_url: None,
            data_provider_api_key: None,
        };
        let res = FredRateProvider::from_settings(&settings, Arc::new(MemoryYieldCache::new()));
        assert!(res.is_err());
    }
}
