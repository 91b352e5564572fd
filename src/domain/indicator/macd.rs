//! MACD (Moving Average Convergence Divergence).
//!
//! line = EMA(fast) - EMA(slow), signal = EMA(signal) of the line,
//! histogram = line - signal. Valid from index `slow - 1 + signal - 1`.

use super::ema::ema_values;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd_values(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Vec<Option<MacdPoint>> {
    let mut out = vec![None; values.len()];
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return out;
    }

    let ema_fast = ema_values(values, fast);
    let ema_slow = ema_values(values, slow);

    // The line exists once the slow EMA does.
    let line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .filter_map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema_values(&line, signal_period);

    let offset = slow - 1;
    for (j, (l, s)) in line.iter().zip(signal).enumerate() {
        if let Some(s) = s {
            out[offset + j] = Some(MacdPoint {
                line: *l,
                signal: s,
                histogram: l - s,
            });
        }
    }
    out
}
