//! The strategy contract and the built-in strategies.
//!
//! A strategy sees the bars up to and including the current one and returns
//! the signals to route for that bar. Any
//! `FnMut(&[Bar], NaiveDate) -> Vec<Signal>` closure is a strategy.

use chrono::NaiveDate;

use super::indicator::{self, MacdPoint};
use super::ohlcv::Bar;
use super::signal::{Signal, SignalAction};
use super::volume::{VolumeAnalysis, VolumeBaselineAnalyzer};

pub trait Strategy {
    fn name(&self) -> &str {
        "custom"
    }

    fn on_bar(&mut self, bars: &[Bar], timestamp: NaiveDate) -> Vec<Signal>;
}

impl<F> Strategy for F
where
    F: FnMut(&[Bar], NaiveDate) -> Vec<Signal>,
{
    fn on_bar(&mut self, bars: &[Bar], timestamp: NaiveDate) -> Vec<Signal> {
        self(bars, timestamp)
    }
}

/// Names accepted by [`builtin`].
pub const BUILTIN_NAMES: [&str; 3] = ["volume_breakout", "momentum", "volume_baseline"];

/// Construct a built-in strategy by name.
pub fn builtin(name: &str) -> Option<Box<dyn Strategy>> {
    match name {
        "volume_breakout" => Some(Box::new(VolumeBreakout::default())),
        "momentum" => Some(Box::new(RsiMacdMomentum::default())),
        "volume_baseline" => Some(Box::new(VolumeBaselineStrategy::default())),
        _ => None,
    }
}

/// Trades high-volume days in the direction of the moving-average trend and
/// exits quiet consolidations.
#[derive(Debug, Clone)]
pub struct VolumeBreakout {
    pub volume_period: usize,
    pub fast_period: usize,
    pub slow_period: usize,
    pub breakout_multiple: f64,
    pub quiet_multiple: f64,
    pub base_risk: f64,
}

impl Default for VolumeBreakout {
    fn default() -> Self {
        VolumeBreakout {
            volume_period: 20,
            fast_period: 20,
            slow_period: 50,
            breakout_multiple: 1.5,
            quiet_multiple: 0.5,
            base_risk: 0.15,
        }
    }
}

impl VolumeBreakout {
    /// Scale risk by liquidity (volume over its average): halve it when thin,
    /// add a fifth when heavy.
    fn liquidity_adjusted(&self, liquidity: f64) -> f64 {
        if liquidity < 0.5 {
            self.base_risk * 0.5
        } else if liquidity > 2.0 {
            (self.base_risk * 1.2).min(1.0)
        } else {
            self.base_risk
        }
    }
}

impl Strategy for VolumeBreakout {
    fn name(&self) -> &str {
        "volume_breakout"
    }

    fn on_bar(&mut self, bars: &[Bar], _timestamp: NaiveDate) -> Vec<Signal> {
        let Some(bar) = bars.last() else {
            return Vec::new();
        };
        let (Some(volume_ma), Some(fast), Some(slow)) = (
            indicator::latest(&indicator::volume_sma(bars, self.volume_period)),
            indicator::latest(&indicator::sma(bars, self.fast_period)),
            indicator::latest(&indicator::sma(bars, self.slow_period)),
        ) else {
            return Vec::new();
        };
        if volume_ma <= 0.0 {
            return Vec::new();
        }

        let volume = bar.volume as f64;
        let price = bar.close;
        let liquidity = volume / volume_ma;

        if volume > volume_ma * self.breakout_multiple {
            if price > fast && fast > slow {
                return vec![Signal::buy(
                    self.liquidity_adjusted(liquidity),
                    "Volume breakout with uptrend",
                )];
            }
            if price < fast && fast < slow {
                return vec![Signal::sell("Volume breakout with downtrend")];
            }
        } else if volume < volume_ma * self.quiet_multiple && (price - fast).abs() / price < 0.02 {
            return vec![Signal::sell("Low volume consolidation")];
        }
        Vec::new()
    }
}

/// RSI extremes plus MACD crossovers on the wrong side of zero.
#[derive(Debug, Clone)]
pub struct RsiMacdMomentum {
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for RsiMacdMomentum {
    fn default() -> Self {
        RsiMacdMomentum {
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl Strategy for RsiMacdMomentum {
    fn name(&self) -> &str {
        "momentum"
    }

    fn on_bar(&mut self, bars: &[Bar], _timestamp: NaiveDate) -> Vec<Signal> {
        let mut signals = Vec::new();

        if let Some(rsi) = indicator::latest(&indicator::rsi(bars, self.rsi_period)) {
            if rsi < self.oversold {
                signals.push(Signal::buy(0.1, "RSI oversold"));
            } else if rsi > self.overbought {
                signals.push(Signal::sell("RSI overbought"));
            }
        }

        let macd = indicator::macd(bars, self.macd_fast, self.macd_slow, self.macd_signal);
        if let Some(MacdPoint { line, signal, .. }) = indicator::latest(&macd) {
            if line > signal && line < 0.0 {
                signals.push(Signal::buy(0.15, "MACD bullish crossover"));
            } else if line < signal && line > 0.0 {
                signals.push(Signal::sell("MACD bearish crossover"));
            }
        }

        signals
    }
}

/// One strategy instance follows one symbol's series.
const SERIES_KEY: &str = "series";

/// Buys unusual volume against the EMA baseline and sells when volume fades.
#[derive(Debug, Clone)]
pub struct VolumeBaselineStrategy {
    analyzer: VolumeBaselineAnalyzer,
    pub risk_fraction: f64,
}

impl Default for VolumeBaselineStrategy {
    fn default() -> Self {
        VolumeBaselineStrategy {
            analyzer: VolumeBaselineAnalyzer::default(),
            risk_fraction: 0.1,
        }
    }
}

impl VolumeBaselineStrategy {
    pub fn new(analyzer: VolumeBaselineAnalyzer, risk_fraction: f64) -> Self {
        VolumeBaselineStrategy {
            analyzer,
            risk_fraction,
        }
    }
}

impl Strategy for VolumeBaselineStrategy {
    fn name(&self) -> &str {
        "volume_baseline"
    }

    fn on_bar(&mut self, bars: &[Bar], _timestamp: NaiveDate) -> Vec<Signal> {
        let Some(bar) = bars.last() else {
            return Vec::new();
        };
        let VolumeAnalysis::Ready(reading) = self.analyzer.update(SERIES_KEY, bar.volume as f64) else {
            return Vec::new();
        };

        match reading.trend.leaning() {
            SignalAction::Buy => vec![Signal::buy(
                self.risk_fraction,
                format!("Volume {:.2}x baseline", reading.volume_ratio),
            )],
            SignalAction::Sell => vec![Signal::sell(format!(
                "Volume below baseline ({:.2}x)",
                reading.volume_ratio
            ))],
            SignalAction::Hold => Vec::new(),
        }
    }
}
