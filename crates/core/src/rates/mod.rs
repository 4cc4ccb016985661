pub mod cache;
pub mod fred;

use std::fmt;

#[async_trait::async_trait]
pub trait RateProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Current AAA corporate bond yield, in percent (e.g. `4.88`).
    async fn current_yield(&self) -> anyhow::Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateErrorKind {
    Http,
    NoObservations,
    InvalidValue,
}

#[derive(Debug, Clone)]
pub struct RateError {
    pub kind: RateErrorKind,
    pub detail: String,
}

impl RateError {
    pub fn new(kind: RateErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate provider error (kind={:?}): {}", self.kind, self.detail)
    }
}

impl std::error::Error for RateError {}
