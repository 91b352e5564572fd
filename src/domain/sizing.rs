//! Risk-fraction position sizing.

use super::signal::{Signal, SignalAction};

/// Converts a BUY signal's risk fraction into a whole-share quantity.
///
/// The target value is `risk × portfolio_value`, clamped to
/// `[min_position_size, max_position_size] × portfolio_value` and then to
/// the cash on hand.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizer {
    pub min_position_size: f64,
    pub max_position_size: f64,
    pub default_risk_fraction: f64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        PositionSizer {
            min_position_size: 0.05,
            max_position_size: 0.20,
            default_risk_fraction: 0.1,
        }
    }
}

impl PositionSizer {
    pub fn new(min_position_size: f64, max_position_size: f64, default_risk_fraction: f64) -> Self {
        PositionSizer {
            min_position_size,
            max_position_size,
            default_risk_fraction,
        }
    }

    /// Dollar amount to commit before rounding to shares.
    pub fn target_value(&self, risk_fraction: f64, portfolio_value: f64, cash_available: f64) -> f64 {
        let lower = self.min_position_size * portfolio_value;
        let upper = self.max_position_size * portfolio_value;
        let target = (risk_fraction * portfolio_value).max(lower).min(upper);
        target.min(cash_available).max(0.0)
    }

    /// Shares to buy for `signal`. Anything other than BUY sizes to zero;
    /// sells close the whole position and never consult the sizer.
    pub fn size(&self, signal: &Signal, portfolio_value: f64, cash_available: f64, price: f64) -> u64 {
        if signal.action != SignalAction::Buy {
            return 0;
        }
        if !price.is_finite() || price <= 0.0 || !portfolio_value.is_finite() {
            return 0;
        }

        let risk = signal.risk_fraction.unwrap_or(self.default_risk_fraction);
        let target = self.target_value(risk, portfolio_value, cash_available);
        if target < price {
            return 0;
        }
        (target / price).floor() as u64
    }
}
