use crate::config::Settings;
use crate::domain::snapshot::SecuritySnapshot;
use crate::ingest::types::{GrowthResponse, QuoteResponse, TickersResponse, CURRENT_YEAR_ESTIMATE};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
const TICKERS_PATH: &str = "/v1/tickers";
const QUOTES_PATH: &str = "/v1/quotes";
const GROWTH_PATH: &str = "/v1/growth";

#[async_trait::async_trait]
pub trait FinancialDataSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_tickers(&self) -> Result<Vec<String>>;

    /// `Ok(None)` when the feed has no price or no EPS for the ticker.
    async fn fetch_snapshot(&self, ticker: &str) -> Result<Option<SecuritySnapshot>>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonDataSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retries: u32,
    backoff_base: Duration,
}

impl HttpJsonDataSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DATA_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let mut source = Self::new(base_url, settings.data_provider_api_key.clone())?;
        source.http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;
        source.retries = retries.max(1);
        Ok(source)
    }

    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            retries: DEFAULT_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        })
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * (1u32 << attempt.min(16))
    }

    /// GET with exponential backoff on 429 and transport errors. Returns the last
    /// response once retries are exhausted, which may still be a 429.
    async fn get_with_backoff(&self, url: &str, ticker: &str) -> Result<reqwest::Response> {
        let headers = self.headers()?;
        let mut attempt: u32 = 0;
        loop {
            let res = self.http.get(url).headers(headers.clone()).send().await;
            let last = attempt + 1 >= self.retries;
            match res {
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS && !last => {
                    let backoff = self.backoff(attempt);
                    tracing::warn!(%ticker, attempt, ?backoff, "rate limited (HTTP 429); backing off");
                    tokio::time::sleep(backoff).await;
                }
                Ok(resp) => return Ok(resp),
                Err(err) if !last => {
                    let backoff = self.backoff(attempt);
                    tracing::warn!(%ticker, attempt, ?backoff, error = %err, "request failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("request for {ticker} failed"));
                }
            }
            attempt += 1;
        }
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Option<QuoteResponse>> {
        let url = self.url(&format!("{QUOTES_PATH}/{ticker}"));
        let res = self.get_with_backoff(&url, ticker).await?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("quote HTTP {status} for {ticker}");
        }

        let quote = res
            .json::<QuoteResponse>()
            .await
            .with_context(|| format!("failed to parse quote for {ticker}"))?;
        Ok(Some(quote))
    }

    /// Current-year growth estimate as a fraction. Degrades to 0 on access errors,
    /// missing rows and exhausted retries instead of failing the ticker.
    async fn fetch_growth(&self, ticker: &str) -> f64 {
        let url = self.url(&format!("{GROWTH_PATH}/{ticker}"));
        let res = match self.get_with_backoff(&url, ticker).await {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(%ticker, error = %err, "growth estimate unavailable; using 0");
                return 0.0;
            }
        };

        let status = res.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            tracing::warn!(%ticker, %status, "growth estimate access denied; using 0");
            return 0.0;
        }
        if !status.is_success() {
            tracing::warn!(%ticker, %status, "growth estimate HTTP error; using 0");
            return 0.0;
        }

        match res.json::<GrowthResponse>().await {
            Ok(body) => current_year_growth(&body),
            Err(err) => {
                tracing::warn!(%ticker, error = %err, "growth estimate unparsable; using 0");
                0.0
            }
        }
    }
}

#[async_trait::async_trait]
impl FinancialDataSource for HttpJsonDataSource {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_tickers(&self) -> Result<Vec<String>> {
        let res = self
            .http
            .get(self.url(TICKERS_PATH))
            .headers(self.headers()?)
            .send()
            .await
            .context("ticker list request failed")?;

        let status = res.status();
        anyhow::ensure!(status.is_success(), "ticker list HTTP {status}");

        let body = res
            .json::<TickersResponse>()
            .await
            .context("failed to parse ticker list")?;

        Ok(body
            .tickers
            .iter()
            .map(|t| normalize_ticker(t))
            .filter(|t| !t.is_empty())
            .collect())
    }

    async fn fetch_snapshot(&self, ticker: &str) -> Result<Option<SecuritySnapshot>> {
        let quote = match self.fetch_quote(ticker).await? {
            Some(q) => q,
            None => return Ok(None),
        };

        let (price, eps) = match (quote.current_price, quote.trailing_eps) {
            (Some(p), Some(e)) => (p, e),
            _ => {
                tracing::debug!(%ticker, "quote lacks price or eps");
                return Ok(None);
            }
        };

        let growth = self.fetch_growth(ticker).await;
        tracing::debug!(%ticker, growth, "growth estimate");

        Ok(Some(SecuritySnapshot::from_feed(
            ticker,
            price,
            eps,
            growth,
            quote.price_to_book,
            quote.debt_to_equity,
        )))
    }
}

/// Class-share suffixes use `-` on the quote feed (`BRK.B` -> `BRK-B`).
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().replace('.', "-").to_ascii_uppercase()
}

/// `"5.20%"` -> `0.052`; anything unparsable -> `0.0`.
pub fn parse_percent(value: &str) -> f64 {
    value
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v / 100.0)
        .unwrap_or(0.0)
}

fn current_year_growth(body: &GrowthResponse) -> f64 {
    body.estimates
        .get(CURRENT_YEAR_ESTIMATE)
        .map(|s| parse_percent(s))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> HttpJsonDataSource {
        HttpJsonDataSource::new(server.uri(), None)
            .unwrap()
            .with_backoff_base(Duration::from_millis(1))
    }

    async fn mount_quote(server: &MockServer, ticker: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("{QUOTES_PATH}/{ticker}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn parses_percent_strings() {
        assert_eq!(parse_percent("12.50%"), 0.125);
        assert_eq!(parse_percent(" -3% "), -0.03);
        assert_eq!(parse_percent("N/A"), 0.0);
        assert_eq!(parse_percent(""), 0.0);
    }

    #[test]
    fn normalizes_class_share_tickers() {
        assert_eq!(normalize_ticker(" brk.b "), "BRK-B");
        assert_eq!(normalize_ticker("MSFT"), "MSFT");
    }

    #[tokio::test]
    async fn builds_snapshot_with_growth_and_sentinel_ratios() {
        let server = MockServer::start().await;
        mount_quote(
            &server,
            "AAPL",
            json!({"ticker": "AAPL", "current_price": 150.0, "trailing_eps": 6.0, "price_to_book": 999, "debt_to_equity": 80.5}),
        )
        .await;
        Mock::given(method("GET"))
            .and(path(format!("{GROWTH_PATH}/AAPL")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "estimates": {"Current qtr.": "1.00%", "Current year": "8.50%"}
            })))
            .mount(&server)
            .await;

        let snap = source(&server).fetch_snapshot("AAPL").await.unwrap().unwrap();
        assert_eq!(snap.ticker, "AAPL");
        assert_eq!(snap.price, 150.0);
        assert_eq!(snap.growth, 0.085);
        assert_eq!(snap.price_to_book, None);
        assert_eq!(snap.debt_to_equity, Some(80.5));
    }

    #[tokio::test]
    async fn missing_eps_means_unavailable() {
        let server = MockServer::start().await;
        mount_quote(&server, "XYZ", json!({"current_price": 10.0})).await;

        let snap = source(&server).fetch_snapshot("XYZ").await.unwrap();
        assert!(snap.is_none());
    }

    #[tokio::test]
    async fn growth_access_denied_degrades_to_zero() {
        let server = MockServer::start().await;
        mount_quote(&server, "T", json!({"current_price": 20.0, "trailing_eps": 2.0})).await;
        Mock::given(method("GET"))
            .and(path(format!("{GROWTH_PATH}/T")))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let snap = source(&server).fetch_snapshot("T").await.unwrap().unwrap();
        assert_eq!(snap.growth, 0.0);
    }

    #[tokio::test]
    async fn growth_rate_limit_retries_three_times_then_degrades() {
        let server = MockServer::start().await;
        mount_quote(&server, "KO", json!({"current_price": 60.0, "trailing_eps": 2.5})).await;
        Mock::given(method("GET"))
            .and(path(format!("{GROWTH_PATH}/KO")))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let snap = source(&server).fetch_snapshot("KO").await.unwrap().unwrap();
        assert_eq!(snap.growth, 0.0);
    }

    #[tokio::test]
    async fn quote_server_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{QUOTES_PATH}/BAD")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(source(&server).fetch_snapshot("BAD").await.is_err());
    }

    #[tokio::test]
    async fn fetches_and_normalizes_ticker_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TICKERS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"tickers": ["MMM", "BRK.B", " "]})),
            )
            .mount(&server)
            .await;

        let tickers = source(&server).fetch_tickers().await.unwrap();
        assert_eq!(tickers, vec!["MMM".to_string(), "BRK-B".to_string()]);
    }
}
