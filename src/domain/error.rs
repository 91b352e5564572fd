//! Domain error types.
//!
//! Business-level failures (a rejected signal, an unavailable provider) are
//! values the engine records and keeps going with. Only configuration problems,
//! I/O and broken ledger invariants surface as [`StratsimError`].

use chrono::NaiveDate;

/// Why a bar or series failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BarError {
    #[error("{date}: non-positive or non-finite price (o={open}, h={high}, l={low}, c={close})")]
    Price {
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("{date}: OHLC out of range (o={open}, h={high}, l={low}, c={close})")]
    Range {
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("dates not strictly increasing: {previous} followed by {next}")]
    Order { previous: NaiveDate, next: NaiveDate },

    #[error("volume {0} is not a whole number of shares")]
    Volume(f64),
}

/// A strategy signal that cannot be routed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    #[error("unrecognized signal action '{0}'")]
    UnknownAction(String),

    #[error("risk_fraction {0} outside (0, 1]")]
    RiskOutOfRange(f64),
}

/// Invalid volume-baseline analyzer parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VolumeConfigError {
    #[error("lookback_days must be in 1..={max}, got {got}")]
    Lookback { got: usize, max: usize },

    #[error("unusual_threshold must be >= 1.0, got {0}")]
    Threshold(f64),
}

/// Top-level error type for stratsim.
#[derive(Debug, thiserror::Error)]
pub enum StratsimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    /// Cash or quantity went negative inside the ledger. Always fatal.
    #[error("ledger invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratsimError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        StratsimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        StratsimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&StratsimError> for std::process::ExitCode {
    fn from(err: &StratsimError) -> Self {
        let code: u8 = match err {
            StratsimError::Io(_) => 1,
            StratsimError::ConfigParse { .. }
            | StratsimError::ConfigMissing { .. }
            | StratsimError::ConfigInvalid { .. } => 2,
            StratsimError::InvariantViolation { .. } => 3,
            StratsimError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
