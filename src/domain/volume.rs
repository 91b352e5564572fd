//! Rolling EMA volume baseline per symbol.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use super::error::VolumeConfigError;
use super::signal::SignalAction;

/// Volumes retained per symbol.
pub const MAX_HISTORY: usize = 90;
const MOMENTUM_WINDOW: usize = 5;
const STRONG_MOMENTUM: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    UnusualHigh,
    Decreasing,
    Stable,
}

impl VolumeTrend {
    /// Direction a volume-driven strategy would lean given this trend.
    pub fn leaning(self) -> SignalAction {
        match self {
            VolumeTrend::UnusualHigh => SignalAction::Buy,
            VolumeTrend::Decreasing => SignalAction::Sell,
            VolumeTrend::Stable => SignalAction::Hold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeReading {
    pub current_volume: f64,
    pub baseline: f64,
    pub volume_ratio: f64,
    pub trend: VolumeTrend,
    /// Fractional change from the oldest to the newest of the last five observations.
    pub momentum: f64,
    pub unusual_activity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VolumeAnalysis {
    InsufficientData {
        observations: usize,
        required: usize,
        current_volume: f64,
    },
    Ready(VolumeReading),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeBaselineState {
    pub baseline: f64,
    pub history: VecDeque<f64>,
}

#[derive(Debug, Clone)]
pub struct VolumeBaselineAnalyzer {
    lookback_days: usize,
    unusual_threshold: f64,
    states: HashMap<String, VolumeBaselineState>,
}

impl Default for VolumeBaselineAnalyzer {
    fn default() -> Self {
        VolumeBaselineAnalyzer {
            lookback_days: 30,
            unusual_threshold: 1.15,
            states: HashMap::new(),
        }
    }
}

impl VolumeBaselineAnalyzer {
    /// `lookback_days` must be within `1..=90`; a longer lookback could never
    /// accumulate enough history.
    pub fn new(lookback_days: usize, unusual_threshold: f64) -> Result<Self, VolumeConfigError> {
        if lookback_days == 0 || lookback_days > MAX_HISTORY {
            return Err(VolumeConfigError::Lookback {
                got: lookback_days,
                max: MAX_HISTORY,
            });
        }
        if !unusual_threshold.is_finite() || unusual_threshold < 1.0 {
            return Err(VolumeConfigError::Threshold(unusual_threshold));
        }
        Ok(VolumeBaselineAnalyzer {
            lookback_days,
            unusual_threshold,
            states: HashMap::new(),
        })
    }

    pub fn lookback_days(&self) -> usize {
        self.lookback_days
    }

    pub fn state(&self, symbol: &str) -> Option<&VolumeBaselineState> {
        self.states.get(symbol)
    }

    /// Fold one observation into the symbol's baseline and classify it.
    pub fn update(&mut self, symbol: &str, new_volume: f64) -> VolumeAnalysis {
        let alpha = 2.0 / (self.lookback_days as f64 + 1.0);
        let state = self.states.entry(symbol.to_string()).or_default();

        state.baseline = if state.history.is_empty() {
            new_volume
        } else {
            alpha * new_volume + (1.0 - alpha) * state.baseline
        };
        state.history.push_back(new_volume);
        if state.history.len() > MAX_HISTORY {
            state.history.pop_front();
        }

        self.analyze(symbol)
    }

    /// Classify the newest observation without changing state.
    pub fn analyze(&self, symbol: &str) -> VolumeAnalysis {
        let Some(state) = self.states.get(symbol) else {
            return VolumeAnalysis::InsufficientData {
                observations: 0,
                required: self.lookback_days,
                current_volume: 0.0,
            };
        };
        let current_volume = state.history.back().copied().unwrap_or(0.0);

        if state.history.len() < self.lookback_days {
            debug!(
                symbol,
                observations = state.history.len(),
                required = self.lookback_days,
                "insufficient volume history"
            );
            return VolumeAnalysis::InsufficientData {
                observations: state.history.len(),
                required: self.lookback_days,
                current_volume,
            };
        }

        let volume_ratio = if state.baseline > 0.0 {
            current_volume / state.baseline
        } else {
            0.0
        };

        let trend = if volume_ratio >= self.unusual_threshold {
            VolumeTrend::UnusualHigh
        } else if volume_ratio < 1.0 {
            VolumeTrend::Decreasing
        } else {
            VolumeTrend::Stable
        };

        VolumeAnalysis::Ready(VolumeReading {
            current_volume,
            baseline: state.baseline,
            volume_ratio,
            trend,
            momentum: momentum(&state.history),
            unusual_activity: trend == VolumeTrend::UnusualHigh,
        })
    }

    /// Human-readable alerts for the symbol's latest reading.
    pub fn alerts(&self, symbol: &str) -> Vec<String> {
        let VolumeAnalysis::Ready(reading) = self.analyze(symbol) else {
            return Vec::new();
        };

        let mut alerts = Vec::new();
        if reading.unusual_activity {
            let alert = format!(
                "Unusual volume activity: {:.0} shares ({:.2}x baseline)",
                reading.current_volume, reading.volume_ratio
            );
            warn!(symbol, ratio = reading.volume_ratio, "{alert}");
            alerts.push(alert);
        }
        if reading.momentum > STRONG_MOMENTUM {
            alerts.push(format!(
                "Strong volume momentum: {:.1}% increase over the last {MOMENTUM_WINDOW} observations",
                reading.momentum * 100.0
            ));
        }
        alerts
    }
}

fn momentum(history: &VecDeque<f64>) -> f64 {
    if history.len() < MOMENTUM_WINDOW {
        return 0.0;
    }
    let oldest = history[history.len() - MOMENTUM_WINDOW];
    let newest = history[history.len() - 1];
    if oldest > 0.0 {
        (newest - oldest) / oldest
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ten_observations_with_30_day_lookback_is_insufficient() {
        let mut analyzer = VolumeBaselineAnalyzer::default();
        let mut last = None;
        for _ in 0..10 {
            last = Some(analyzer.update("AAPL", 1_000_000.0));
        }
        assert_eq!(
            last.unwrap(),
            VolumeAnalysis::InsufficientData {
                observations: 10,
                required: 30,
                current_volume: 1_000_000.0,
            }
        );
    }

    #[test]
    fn baseline_is_incremental_ema_seeded_with_first() {
        let mut analyzer = VolumeBaselineAnalyzer::new(3, 1.15).unwrap();
        analyzer.update("X", 100.0);
        analyzer.update("X", 200.0);
        analyzer.update("X", 400.0);
        // alpha = 0.5: 100 -> 150 -> 275
        assert_relative_eq!(analyzer.state("X").unwrap().baseline, 275.0);
    }

    #[test]
    fn spike_is_unusual_high() {
        let mut analyzer = VolumeBaselineAnalyzer::new(5, 1.15).unwrap();
        for _ in 0..5 {
            analyzer.update("X", 1_000.0);
        }
        let VolumeAnalysis::Ready(reading) = analyzer.update("X", 3_000.0) else {
            panic!("expected reading");
        };
        // baseline = 1000 + (3000-1000)/3
        assert_relative_eq!(reading.baseline, 1_000.0 + 2_000.0 / 3.0, epsilon = 1e-9);
        assert_eq!(reading.trend, VolumeTrend::UnusualHigh);
        assert!(reading.unusual_activity);
        assert_eq!(reading.trend.leaning(), SignalAction::Buy);
    }

    #[test]
    fn drop_is_decreasing_and_flat_is_stable() {
        let mut analyzer = VolumeBaselineAnalyzer::new(5, 1.15).unwrap();
        for _ in 0..5 {
            analyzer.update("X", 1_000.0);
        }
        let VolumeAnalysis::Ready(flat) = analyzer.analyze("X") else {
            panic!("expected reading");
        };
        assert_eq!(flat.trend, VolumeTrend::Stable);

        let VolumeAnalysis::Ready(drop) = analyzer.update("X", 500.0) else {
            panic!("expected reading");
        };
        assert_eq!(drop.trend, VolumeTrend::Decreasing);
    }

    #[test]
    fn momentum_over_last_five() {
        let mut analyzer = VolumeBaselineAnalyzer::new(5, 1.15).unwrap();
        for v in [999.0, 100.0, 110.0, 120.0, 130.0, 150.0] {
            analyzer.update("X", v);
        }
        let VolumeAnalysis::Ready(reading) = analyzer.analyze("X") else {
            panic!("expected reading");
        };
        assert_relative_eq!(reading.momentum, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn history_capped_at_90() {
        let mut analyzer = VolumeBaselineAnalyzer::default();
        for i in 0..120 {
            analyzer.update("X", 1_000.0 + i as f64);
        }
        let state = analyzer.state("X").unwrap();
        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_relative_eq!(*state.history.front().unwrap(), 1_030.0);
    }

    #[test]
    fn zero_baseline_gives_zero_ratio() {
        let mut analyzer = VolumeBaselineAnalyzer::new(1, 1.15).unwrap();
        let VolumeAnalysis::Ready(reading) = analyzer.update("X", 0.0) else {
            panic!("expected reading");
        };
        assert_eq!(reading.volume_ratio, 0.0);
    }

    #[test]
    fn symbols_are_independent() {
        let mut analyzer = VolumeBaselineAnalyzer::new(2, 1.15).unwrap();
        analyzer.update("A", 100.0);
        analyzer.update("B", 100.0);
        assert!(matches!(
            analyzer.analyze("A"),
            VolumeAnalysis::InsufficientData { observations: 1, .. }
        ));
    }

    #[test]
    fn alerts_for_spike_and_momentum() {
        let mut analyzer = VolumeBaselineAnalyzer::new(5, 1.15).unwrap();
        for _ in 0..5 {
            analyzer.update("X", 1_000.0);
        }
        analyzer.update("X", 3_000.0);
        let alerts = analyzer.alerts("X");
        assert_eq!(alerts.len(), 2);
        assert!(alerts[0].starts_with("Unusual volume activity"));
        assert!(alerts[1].starts_with("Strong volume momentum"));
        assert!(analyzer.alerts("UNKNOWN").is_empty());
    }

    #[test]
    fn invalid_lookback_rejected() {
        assert!(VolumeBaselineAnalyzer::new(0, 1.15).is_err());
        assert_eq!(
            VolumeBaselineAnalyzer::new(91, 1.15).unwrap_err(),
            VolumeConfigError::Lookback { got: 91, max: MAX_HISTORY }
        );
        assert_eq!(
            VolumeBaselineAnalyzer::new(30, 0.5).unwrap_err(),
            VolumeConfigError::Threshold(0.5)
        );
    }
}
