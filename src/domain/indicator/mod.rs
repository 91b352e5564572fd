//! Technical indicators as pure functions.
//!
//! Every function returns a new series aligned index-for-index with its input.
//! Warmup positions are `None`. Inputs are never mutated.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use ema::ema_values;
pub use macd::{MacdPoint, macd_values};
pub use rsi::rsi_values;
pub use sma::sma_values;

use crate::domain::ohlcv::{Bar, closes, volumes};

/// Simple moving average of closes.
pub fn sma(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    sma_values(&closes(bars), period)
}

/// Exponential moving average of closes.
pub fn ema(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    ema_values(&closes(bars), period)
}

/// Wilder RSI of closes.
pub fn rsi(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    rsi_values(&closes(bars), period)
}

/// MACD of closes.
pub fn macd(bars: &[Bar], fast: usize, slow: usize, signal: usize) -> Vec<Option<MacdPoint>> {
    macd_values(&closes(bars), fast, slow, signal)
}

/// Simple moving average of volume.
pub fn volume_sma(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    sma_values(&volumes(bars), period)
}

/// Last value of an aligned series, if it is past warmup.
pub fn latest<T: Copy>(series: &[Option<T>]) -> Option<T> {
    series.last().copied().flatten()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_wrappers_align_with_input() {
        let bars = test_bars::from_closes(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        assert_eq!(sma(&bars, 3).len(), 5);
        assert_eq!(ema(&bars, 3).len(), 5);
        assert_eq!(rsi(&bars, 3).len(), 5);
        assert_eq!(macd(&bars, 2, 3, 2).len(), 5);
    }

    #[test]
    fn volume_sma_uses_volume() {
        let bars = test_bars::from_closes(&[10.0, 10.0, 10.0]);
        // volumes 1000, 2000, 3000
        assert_eq!(volume_sma(&bars, 3), vec![None, None, Some(2_000.0)]);
    }

    #[test]
    fn indicators_leave_input_untouched() {
        let bars = test_bars::from_closes(&[10.0, 12.0, 11.0]);
        let before = bars.clone();
        let _ = sma(&bars, 2);
        let _ = rsi(&bars, 2);
        assert_eq!(bars, before);
    }

    #[test]
    fn latest_skips_warmup() {
        assert_eq!(latest::<f64>(&[]), None);
        assert_eq!(latest(&[None, Some(1.0)]), Some(1.0));
        assert_eq!(latest::<f64>(&[Some(1.0), None]), None);
    }
}
