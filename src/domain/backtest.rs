//! Per-bar backtest loop.
//!
//! A run moves `INIT → LOADING_DATA → RUNNING → FINALIZING → DONE`, or into
//! `FAILED` from any non-terminal state. [`BacktestSession`] exposes the
//! RUNNING phase one bar at a time so a caller can stop between bars;
//! [`StrategyRunner::run`] drives a session to completion.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use super::config::EngineConfig;
use super::data_source::{DataSourceManager, SourceFailure, SourceSelection};
use super::error::StratsimError;
use super::execution::{ExecutionOutcome, ExecutionSimulator, Order, Rejection};
use super::metrics::PerformanceReport;
use super::ohlcv::Bar;
use super::portfolio::PortfolioLedger;
use super::position::{Position, Side, Trade};
use super::signal::{Signal, SignalAction};
use super::sizing::PositionSizer;
use super::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    LoadingData,
    Running,
    Finalizing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "INIT",
            RunState::LoadingData => "LOADING_DATA",
            RunState::Running => "RUNNING",
            RunState::Finalizing => "FINALIZING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// A signal that never became a trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedSignal {
    pub timestamp: NaiveDate,
    pub action: SignalAction,
    /// `invalid_signal`, `insufficient_funds`, `no_position` or `zero_quantity`.
    pub code: String,
    pub detail: String,
    /// The strategy's stated reason for the signal.
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Everything a run produced. Failed runs carry `incomplete = true` and no
/// performance figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub strategy: String,
    pub state: RunState,
    pub incomplete: bool,
    pub performance: Option<PerformanceReport>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub daily_returns: Vec<f64>,
    pub data_source: Option<String>,
    pub source_failures: Vec<SourceFailure>,
    pub rejected_signals: Vec<RejectedSignal>,
    pub final_cash: f64,
    pub final_positions: BTreeMap<String, Position>,
}

/// What one call to [`BacktestSession::step`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Advanced { date: NaiveDate, value: f64 },
    Exhausted,
}

/// Wires a data source manager to the engine settings.
#[derive(Debug)]
pub struct StrategyRunner {
    config: EngineConfig,
    data: DataSourceManager,
}

impl StrategyRunner {
    pub fn new(config: EngineConfig, data: DataSourceManager) -> Self {
        StrategyRunner { config, data }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data(&self) -> &DataSourceManager {
        &self.data
    }

    /// Load data and return a session positioned before the first bar.
    /// A data failure yields a session already in `FAILED`.
    pub fn start(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        source: &SourceSelection,
    ) -> BacktestSession {
        let mut session = BacktestSession::new(symbol, &self.config);
        session.transition(RunState::LoadingData);

        match self.data.fetch(symbol, start, end, source) {
            Ok(sourced) => {
                session.data_source = Some(sourced.provider);
                session.source_failures = sourced.failures;
                session.bars = sourced.bars;
                session.transition(RunState::Running);
            }
            Err(exhausted) => {
                warn!(symbol, error = %exhausted, "run failed while loading data");
                session.source_failures = exhausted.failures;
                session.transition(RunState::Failed);
            }
        }
        session
    }

    /// Run `strategy` over `symbol` using any configured provider.
    pub fn run<S: Strategy + ?Sized>(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        strategy: &mut S,
    ) -> Result<BacktestReport, StratsimError> {
        self.run_with_source(symbol, start, end, &SourceSelection::Auto, strategy)
    }

    pub fn run_with_source<S: Strategy + ?Sized>(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        source: &SourceSelection,
        strategy: &mut S,
    ) -> Result<BacktestReport, StratsimError> {
        let mut session = self.start(symbol, start, end, source);
        while let StepOutcome::Advanced { .. } = session.step(strategy)? {}
        Ok(session.finish(strategy.name()))
    }
}

/// One symbol's run, advanced a bar at a time.
#[derive(Debug)]
pub struct BacktestSession {
    symbol: String,
    state: RunState,
    bars: Vec<Bar>,
    cursor: usize,
    ledger: PortfolioLedger,
    sizer: PositionSizer,
    simulator: ExecutionSimulator,
    risk_free_rate: f64,
    /// Initial capital followed by each end-of-bar value.
    values: Vec<f64>,
    equity_curve: Vec<EquityPoint>,
    rejected: Vec<RejectedSignal>,
    data_source: Option<String>,
    source_failures: Vec<SourceFailure>,
}

impl BacktestSession {
    fn new(symbol: &str, config: &EngineConfig) -> Self {
        BacktestSession {
            symbol: symbol.to_string(),
            state: RunState::Init,
            bars: Vec::new(),
            cursor: 0,
            ledger: PortfolioLedger::new(config.initial_capital),
            sizer: config.sizer(),
            simulator: config.simulator(),
            risk_free_rate: config.risk_free_rate,
            values: vec![config.initial_capital],
            equity_curve: Vec::new(),
            rejected: Vec::new(),
            data_source: None,
            source_failures: Vec::new(),
        }
    }

    /// Start a session over bars the caller already holds.
    pub fn from_bars(symbol: &str, bars: Vec<Bar>, config: &EngineConfig) -> Self {
        let mut session = BacktestSession::new(symbol, config);
        session.transition(RunState::LoadingData);
        session.bars = bars;
        session.transition(RunState::Running);
        session
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn bars_processed(&self) -> usize {
        self.cursor
    }

    pub fn bars_remaining(&self) -> usize {
        self.bars.len().saturating_sub(self.cursor)
    }

    fn transition(&mut self, next: RunState) {
        debug!(symbol = %self.symbol, from = %self.state, to = %next, "run state transition");
        self.state = next;
    }

    /// Process the next bar: mark, call the strategy with history up to and
    /// including this bar, settle its signals in order, then record the
    /// end-of-bar value.
    pub fn step<S: Strategy + ?Sized>(
        &mut self,
        strategy: &mut S,
    ) -> Result<StepOutcome, StratsimError> {
        if self.state != RunState::Running || self.cursor >= self.bars.len() {
            return Ok(StepOutcome::Exhausted);
        }

        let t = self.cursor;
        let (date, close) = (self.bars[t].date, self.bars[t].close);
        let prices = HashMap::from([(self.symbol.clone(), close)]);
        self.ledger.mark(&self.symbol, close);

        let signals = strategy.on_bar(&self.bars[..=t], date);
        for signal in &signals {
            if let Err(e) = self.route(signal, date, close, &prices) {
                self.transition(RunState::Failed);
                return Err(e);
            }
        }

        let value = self.ledger.current_value(&prices);
        self.values.push(value);
        self.equity_curve.push(EquityPoint { date, value });
        self.cursor += 1;
        Ok(StepOutcome::Advanced { date, value })
    }

    fn route(
        &mut self,
        signal: &Signal,
        date: NaiveDate,
        close: f64,
        prices: &HashMap<String, f64>,
    ) -> Result<(), StratsimError> {
        if let Err(e) = signal.validate() {
            self.reject(signal, date, "invalid_signal", e.to_string(), false);
            return Ok(());
        }

        let (side, shares) = match signal.action {
            SignalAction::Hold => return Ok(()),
            SignalAction::Buy => {
                let value = self.ledger.current_value(prices);
                let shares = self.sizer.size(signal, value, self.ledger.cash(), close);
                (Side::Buy, shares)
            }
            SignalAction::Sell => (Side::Sell, self.ledger.held_quantity(&self.symbol)),
        };

        let order = Order {
            symbol: &self.symbol,
            shares,
            reference_price: close,
            side,
            timestamp: date,
            reason: &signal.reason,
        };
        match self.simulator.execute(&mut self.ledger, &order)? {
            ExecutionOutcome::Filled(trade) => {
                debug!(
                    symbol = %self.symbol,
                    %date,
                    side = %trade.side,
                    quantity = trade.quantity,
                    price = trade.execution_price,
                    "filled"
                );
            }
            ExecutionOutcome::Rejected(rejection) => {
                // Exits with nothing held are routine for stateless strategies.
                let routine = matches!(rejection, Rejection::NoPosition { .. });
                self.reject(signal, date, rejection.code(), rejection.to_string(), routine);
            }
        }
        Ok(())
    }

    fn reject(
        &mut self,
        signal: &Signal,
        date: NaiveDate,
        code: &str,
        detail: String,
        routine: bool,
    ) {
        if routine {
            debug!(
                symbol = %self.symbol,
                %date,
                action = %signal.action,
                reason = %signal.reason,
                code,
                "signal rejected"
            );
        } else {
            warn!(
                symbol = %self.symbol,
                %date,
                action = %signal.action,
                code,
                reason = %signal.reason,
                "signal rejected"
            );
        }
        self.rejected.push(RejectedSignal {
            timestamp: date,
            action: signal.action,
            code: code.to_string(),
            detail,
            reason: signal.reason.clone(),
        });
    }

    /// Compute metrics and close the session. A session stopped early is
    /// finalized over the bars it did process.
    pub fn finish(mut self, strategy_name: &str) -> BacktestReport {
        let performance = if self.state == RunState::Running {
            self.transition(RunState::Finalizing);
            let report =
                PerformanceReport::compute(&self.values, self.ledger.trades(), self.risk_free_rate);
            self.transition(RunState::Done);
            Some(report)
        } else {
            None
        };

        let incomplete = self.state != RunState::Done;
        let daily_returns = super::metrics::daily_returns(&self.values);
        BacktestReport {
            symbol: self.symbol,
            strategy: strategy_name.to_string(),
            state: self.state,
            incomplete,
            performance,
            trades: self.ledger.trades().to_vec(),
            equity_curve: self.equity_curve,
            daily_returns,
            data_source: self.data_source,
            source_failures: self.source_failures,
            rejected_signals: self.rejected,
            final_cash: self.ledger.cash(),
            final_positions: self.ledger.positions_snapshot(),
        }
    }
}
