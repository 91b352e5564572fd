//! Historical data provider port.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::error::BarError;
use crate::domain::ohlcv::Bar;

/// Why a provider could not serve a request. Never fatal to a run: the
/// data source manager records it and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication required: {0}")]
    Unauthorized(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid bars: {0}")]
    InvalidData(#[from] BarError),

    #[error("no bars returned")]
    Empty,

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Transient failures worth another attempt against the same provider.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::RateLimited(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::Unauthorized(message),
            429 => ProviderError::RateLimited(message),
            _ => ProviderError::Http { status, message },
        }
    }
}

/// A source of daily bars. Implementations normalize to ascending dates;
/// validation is the caller's job.
pub trait DataPort: Send + Sync {
    /// Stable lowercase name used in configuration and reports.
    fn name(&self) -> &str;

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::RateLimited("slow down".into()).is_retryable());
        assert!(ProviderError::from_status(503, "unavailable").is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!ProviderError::Empty.is_retryable());
        assert!(!ProviderError::Malformed("bad json".into()).is_retryable());
        assert!(!ProviderError::from_status(404, "missing").is_retryable());
        assert!(!ProviderError::from_status(401, "expired").is_retryable());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            ProviderError::from_status(429, "x"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(403, "x"),
            ProviderError::Unauthorized(_)
        ));
        assert_eq!(
            ProviderError::from_status(500, "boom").to_string(),
            "HTTP 500: boom"
        );
    }
}
