//! Portfolio ledger: cash, open positions and the append-only trade history.

use std::collections::{BTreeMap, HashMap};

use super::error::StratsimError;
use super::position::{Position, Side, Trade};

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioLedger {
    cash: f64,
    initial_capital: f64,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
}

impl PortfolioLedger {
    pub fn new(initial_capital: f64) -> Self {
        PortfolioLedger {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn held_quantity(&self, symbol: &str) -> u64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Positions ordered by symbol.
    pub fn positions_snapshot(&self) -> BTreeMap<String, Position> {
        self.positions
            .iter()
            .map(|(symbol, pos)| (symbol.clone(), pos.clone()))
            .collect()
    }

    /// Record the latest known price for a held symbol.
    pub fn mark(&mut self, symbol: &str, price: f64) {
        if let Some(pos) = self.positions.get_mut(symbol) {
            pos.last_price = price;
        }
    }

    /// Cash plus every position valued at the looked-up price, or its last
    /// mark when the lookup has none.
    pub fn current_value(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = prices.get(&pos.symbol).copied().unwrap_or(pos.last_price);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }

    /// Settle a trade. Cash and position change together or not at all.
    pub fn apply_trade(&mut self, trade: Trade) -> Result<(), StratsimError> {
        if trade.quantity == 0 {
            return Err(violation(format!(
                "{} {} with zero quantity",
                trade.side, trade.symbol
            )));
        }

        let new_cash = self.cash + trade.cash_delta();
        if !(new_cash >= 0.0) {
            return Err(violation(format!(
                "cash would become {new_cash:.2} after {} {} x{}",
                trade.side, trade.symbol, trade.quantity
            )));
        }

        match trade.side {
            Side::Buy => {
                let pos = self
                    .positions
                    .entry(trade.symbol.clone())
                    .or_insert_with(|| Position {
                        symbol: trade.symbol.clone(),
                        quantity: 0,
                        entry_price: 0.0,
                        last_price: trade.execution_price,
                    });
                let old_qty = pos.quantity as f64;
                let new_qty = pos.quantity + trade.quantity;
                pos.entry_price = (old_qty * pos.entry_price + trade.gross_value) / new_qty as f64;
                pos.quantity = new_qty;
                pos.last_price = trade.execution_price;
            }
            Side::Sell => {
                let held = self.held_quantity(&trade.symbol);
                if trade.quantity > held {
                    return Err(violation(format!(
                        "selling {} {} but only {held} held",
                        trade.quantity, trade.symbol
                    )));
                }
                if held == trade.quantity {
                    self.positions.remove(&trade.symbol);
                } else if let Some(pos) = self.positions.get_mut(&trade.symbol) {
                    pos.quantity = held - trade.quantity;
                    pos.last_price = trade.execution_price;
                }
            }
        }

        self.cash = new_cash;
        self.trades.push(trade);
        Ok(())
    }
}

fn violation(reason: String) -> StratsimError {
    StratsimError::InvariantViolation { reason }
}
