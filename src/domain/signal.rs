//! Strategy signals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::SignalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Hold => write!(f, "HOLD"),
        }
    }
}

impl FromStr for SignalAction {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(SignalAction::Buy),
            "sell" => Ok(SignalAction::Sell),
            "hold" => Ok(SignalAction::Hold),
            other => Err(SignalError::UnknownAction(other.to_string())),
        }
    }
}

/// A trading instruction produced by a strategy for the current bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    /// Fraction of portfolio value to commit, in `(0, 1]`. BUY only.
    pub risk_fraction: Option<f64>,
    pub reason: String,
}

impl Signal {
    pub fn buy(risk_fraction: f64, reason: impl Into<String>) -> Self {
        Signal {
            action: SignalAction::Buy,
            risk_fraction: Some(risk_fraction),
            reason: reason.into(),
        }
    }

    pub fn sell(reason: impl Into<String>) -> Self {
        Signal {
            action: SignalAction::Sell,
            risk_fraction: None,
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Signal {
            action: SignalAction::Hold,
            risk_fraction: None,
            reason: reason.into(),
        }
    }

    /// Build a signal from loosely-typed parts, e.g. a strategy written
    /// against string actions.
    pub fn parse(action: &str, risk_fraction: Option<f64>, reason: &str) -> Result<Self, SignalError> {
        let signal = Signal {
            action: action.parse()?,
            risk_fraction,
            reason: reason.to_string(),
        };
        signal.validate()?;
        Ok(signal)
    }

    /// Reject out-of-range risk fractions. A signal failing this never
    /// reaches the sizer.
    pub fn validate(&self) -> Result<(), SignalError> {
        if let Some(risk) = self.risk_fraction {
            if !risk.is_finite() || risk <= 0.0 || risk > 1.0 {
                return Err(SignalError::RiskOutOfRange(risk));
            }
        }
        Ok(())
    }
}
