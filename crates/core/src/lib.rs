pub mod domain;
pub mod ingest;
pub mod pipeline;
pub mod rates;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub fred_api_key: Option<String>,
        pub fred_base_url: Option<String>,
        pub yield_cache_path: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                fred_api_key: non_empty_env("FRED_API_KEY"),
                fred_base_url: non_empty_env("FRED_BASE_URL"),
                yield_cache_path: non_empty_env("YIELD_CACHE_PATH"),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                data_provider_base_url: std::env::var("DATA_PROVIDER_BASE_URL").ok(),
                data_provider_api_key: std::env::var("DATA_PROVIDER_API_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_fred_api_key(&self) -> anyhow::Result<&str> {
            self.fred_api_key
                .as_deref()
                .context("FRED_API_KEY is required")
        }

        pub fn require_data_provider_base_url(&self) -> anyhow::Result<&str> {
            self.data_provider_base_url
                .as_deref()
                .context("DATA_PROVIDER_BASE_URL is required")
        }
    }

    fn non_empty_env(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn empty() -> Settings {
            Settings {
                database_url: None,
                fred_api_key: None,
                fred_base_url: None,
                yield_cache_path: None,
                sentry_dsn: None,
                data_provider_base_url: None,
                data_provider_api_key: None,
            }
        }

        #[test]
        fn missing_fred_key_is_a_configuration_error() {
            let err = empty().require_fred_api_key().unwrap_err();
            assert!(err.to_string().contains("FRED_API_KEY"));
        }

        #[test]
        fn present_fred_key_is_returned() {
            let settings = Settings {
                fred_api_key: Some("abc".to_string()),
                ..empty()
            };
            assert_eq!(settings.require_fred_api_key().unwrap(), "abc");
        }
    }
}
