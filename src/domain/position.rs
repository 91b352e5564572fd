//! Open positions and executed trades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub entry_price: f64,
    /// Last price this position was marked at.
    pub last_price: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.entry_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// An executed fill. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: NaiveDate,
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub execution_price: f64,
    pub commission: f64,
    /// Total adverse price movement paid on this fill (per-share slippage × quantity).
    pub slippage_amount: f64,
    /// `execution_price × quantity`.
    pub gross_value: f64,
    /// Entry price of the position being reduced. SELL only.
    pub cost_basis: Option<f64>,
    pub reason: String,
}

impl Trade {
    /// Signed change to cash when this trade settles.
    pub fn cash_delta(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.gross_value + self.commission),
            Side::Sell => self.gross_value - self.commission,
        }
    }

    /// Realized PnL of a SELL against its cost basis, net of this fill's commission.
    pub fn realized_pnl(&self) -> Option<f64> {
        match (self.side, self.cost_basis) {
            (Side::Sell, Some(basis)) => {
                Some(self.quantity as f64 * (self.execution_price - basis) - self.commission)
            }
            _ => None,
        }
    }

    /// A SELL counts as a win when it fills above the closed position's cost basis.
    pub fn is_win(&self) -> bool {
        matches!((self.side, self.cost_basis), (Side::Sell, Some(basis)) if self.execution_price > basis)
    }
}
