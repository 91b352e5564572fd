//! Fill simulation with slippage and commission.
//!
//! The simulator prices an order, checks that it is affordable (or that
//! the shares exist to sell) and settles it against the ledger in one step.
//! Business rejections come back as values; only a broken ledger invariant
//! is an error.

use chrono::NaiveDate;
use std::fmt;

use super::error::StratsimError;
use super::portfolio::PortfolioLedger;
use super::position::{Side, Trade};

/// Why an order was not filled.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    InsufficientFunds { required: f64, available: f64 },
    NoPosition { requested: u64, held: u64 },
    ZeroQuantity,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InsufficientFunds { .. } => "insufficient_funds",
            Rejection::NoPosition { .. } => "no_position",
            Rejection::ZeroQuantity => "zero_quantity",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InsufficientFunds { required, available } => write!(
                f,
                "insufficient_funds: need {required:.2}, have {available:.2}"
            ),
            Rejection::NoPosition { requested, held } => {
                write!(f, "no_position: requested {requested}, held {held}")
            }
            Rejection::ZeroQuantity => write!(f, "zero_quantity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Filled(Trade),
    Rejected(Rejection),
}

/// An order to simulate.
#[derive(Debug, Clone, PartialEq)]
pub struct Order<'a> {
    pub symbol: &'a str,
    pub shares: u64,
    pub reference_price: f64,
    pub side: Side,
    pub timestamp: NaiveDate,
    pub reason: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSimulator {
    pub commission_per_trade: f64,
    /// Percent of the reference price, so 0.1 means 0.1 %.
    pub slippage_percent: f64,
}

impl Default for ExecutionSimulator {
    fn default() -> Self {
        ExecutionSimulator {
            commission_per_trade: 0.0,
            slippage_percent: 0.1,
        }
    }
}

impl ExecutionSimulator {
    pub fn new(commission_per_trade: f64, slippage_percent: f64) -> Self {
        ExecutionSimulator {
            commission_per_trade,
            slippage_percent,
        }
    }

    /// Per-share slippage at `reference_price`.
    pub fn slippage_per_share(&self, reference_price: f64) -> f64 {
        reference_price * self.slippage_percent / 100.0
    }

    /// Fill price after adverse slippage: higher for buys, lower for sells.
    pub fn execution_price(&self, reference_price: f64, side: Side) -> f64 {
        let slip = self.slippage_per_share(reference_price);
        match side {
            Side::Buy => reference_price + slip,
            Side::Sell => reference_price - slip,
        }
    }

    /// Price `order`, and if it is acceptable apply it to `ledger`.
    pub fn execute(
        &self,
        ledger: &mut PortfolioLedger,
        order: &Order<'_>,
    ) -> Result<ExecutionOutcome, StratsimError> {
        let held = ledger.held_quantity(order.symbol);
        if order.side == Side::Sell && (held == 0 || held < order.shares) {
            return Ok(ExecutionOutcome::Rejected(Rejection::NoPosition {
                requested: order.shares,
                held,
            }));
        }
        if order.shares == 0 {
            return Ok(ExecutionOutcome::Rejected(Rejection::ZeroQuantity));
        }

        let execution_price = self.execution_price(order.reference_price, order.side);
        let gross_value = execution_price * order.shares as f64;
        let slippage_amount = self.slippage_per_share(order.reference_price) * order.shares as f64;

        let cost_basis = match order.side {
            Side::Buy => {
                let total_cost = gross_value + self.commission_per_trade;
                if total_cost > ledger.cash() {
                    return Ok(ExecutionOutcome::Rejected(Rejection::InsufficientFunds {
                        required: total_cost,
                        available: ledger.cash(),
                    }));
                }
                None
            }
            Side::Sell => {
                // Commission larger than the proceeds would overdraw cash.
                let proceeds = gross_value - self.commission_per_trade;
                if ledger.cash() + proceeds < 0.0 {
                    return Ok(ExecutionOutcome::Rejected(Rejection::InsufficientFunds {
                        required: -proceeds,
                        available: ledger.cash(),
                    }));
                }
                ledger.get_position(order.symbol).map(|p| p.entry_price)
            }
        };

        let trade = Trade {
            timestamp: order.timestamp,
            symbol: order.symbol.to_string(),
            side: order.side,
            quantity: order.shares,
            execution_price,
            commission: self.commission_per_trade,
            slippage_amount,
            gross_value,
            cost_basis,
            reason: order.reason.to_string(),
        };
        ledger.apply_trade(trade.clone())?;
        Ok(ExecutionOutcome::Filled(trade))
    }
}
