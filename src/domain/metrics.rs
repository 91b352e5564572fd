//! Performance metrics over a portfolio value series.

use serde::Serialize;

use super::position::{Side, Trade};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior peak.
    pub max_drawdown_duration: usize,
    pub win_rate: f64,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub final_value: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
}

impl PerformanceReport {
    /// Compute every metric. `value_series[0]` is the initial capital and
    /// each later entry is the end-of-bar portfolio value.
    pub fn compute(value_series: &[f64], trades: &[Trade], risk_free_rate: f64) -> Self {
        let initial = value_series.first().copied().unwrap_or(0.0);
        let final_value = value_series.last().copied().unwrap_or(initial);

        let total_return = if initial > 0.0 {
            final_value / initial - 1.0
        } else {
            0.0
        };

        let n_days = value_series.len().saturating_sub(1);
        let annualized_return = if n_days > 0 && total_return > -1.0 {
            let r = (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n_days as f64) - 1.0;
            if r.is_finite() { r } else { 0.0 }
        } else if n_days > 0 {
            -1.0
        } else {
            0.0
        };

        let returns = daily_returns(value_series);
        let volatility = sample_stddev(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
        let excess = annualized_return - risk_free_rate;

        let sharpe_ratio = if volatility > 0.0 {
            excess / volatility
        } else {
            0.0
        };

        let downside = downside_deviation(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
        let sortino_ratio = if downside > 0.0 { excess / downside } else { 0.0 };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(value_series);

        let sells: Vec<&Trade> = trades.iter().filter(|t| t.side == Side::Sell).collect();
        let wins = sells.iter().filter(|t| t.is_win()).count();
        let win_rate = if sells.is_empty() {
            0.0
        } else {
            wins as f64 / sells.len() as f64
        };

        PerformanceReport {
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            win_rate,
            total_trades: trades.len(),
            closed_trades: sells.len(),
            final_value,
            total_commission: trades.iter().map(|t| t.commission).sum(),
            total_slippage: trades.iter().map(|t| t.slippage_amount).sum(),
        }
    }
}

/// `v[t] / v[t-1] - 1` for every consecutive pair; 0 where the prior value is not positive.
pub fn daily_returns(value_series: &[f64]) -> Vec<f64> {
    value_series
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

fn sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

fn downside_deviation(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    (sum_sq / returns.len() as f64).sqrt()
}

/// Maximum fractional drawdown and the longest run of bars below a prior peak.
pub fn compute_drawdown(value_series: &[f64]) -> (f64, usize) {
    let Some(&first) = value_series.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut run = 0usize;
    let mut max_run = 0usize;

    for &value in value_series {
        if value >= peak {
            peak = value;
            run = 0;
            continue;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
        run += 1;
        max_run = max_run.max(run);
    }

    (max_dd, max_run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn sell(price: f64, basis: f64) -> Trade {
        Trade {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            symbol: "AAPL".into(),
            side: Side::Sell,
            quantity: 10,
            execution_price: price,
            commission: 1.0,
            slippage_amount: 0.5,
            gross_value: price * 10.0,
            cost_basis: Some(basis),
            reason: String::new(),
        }
    }

    fn buy(price: f64) -> Trade {
        Trade {
            side: Side::Buy,
            cost_basis: None,
            ..sell(price, 0.0)
        }
    }

    #[test]
    fn drawdown_example() {
        let (dd, duration) = compute_drawdown(&[100.0, 110.0, 90.0, 95.0]);
        assert_relative_eq!(dd, 20.0 / 110.0, epsilon = 1e-12);
        assert_eq!(duration, 2);
    }

    #[test]
    fn drawdown_monotonic_rise_is_zero() {
        assert_eq!(compute_drawdown(&[1.0, 2.0, 3.0]), (0.0, 0));
        assert_eq!(compute_drawdown(&[]), (0.0, 0));
    }

    #[test]
    fn drawdown_recovers_then_deepens() {
        let (dd, duration) = compute_drawdown(&[100.0, 95.0, 101.0, 80.0, 85.0, 90.0, 120.0]);
        assert_relative_eq!(dd, 21.0 / 101.0, epsilon = 1e-12);
        assert_eq!(duration, 3);
    }

    #[test]
    fn total_return_and_final_value() {
        let report = PerformanceReport::compute(&[100_000.0, 105_000.0, 110_000.0], &[], 0.02);
        assert_relative_eq!(report.total_return, 0.10, epsilon = 1e-12);
        assert_relative_eq!(report.final_value, 110_000.0);
    }

    #[test]
    fn annualized_return_uses_252_over_n_days() {
        let mut values = vec![100.0];
        values.extend(std::iter::repeat_n(100.0, 125));
        values.push(110.0);
        let report = PerformanceReport::compute(&values, &[], 0.0);
        let expected = 1.1_f64.powf(252.0 / 126.0) - 1.0;
        assert_relative_eq!(report.annualized_return, expected, epsilon = 1e-12);
    }

    #[test]
    fn flat_series_has_zero_volatility_and_sharpe() {
        let report = PerformanceReport::compute(&[100.0; 10], &[], 0.02);
        assert_eq!(report.volatility, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.sortino_ratio, 0.0);
    }

    #[test]
    fn volatility_is_sample_stddev_annualized() {
        let values = [100.0, 110.0, 99.0, 108.9];
        let report = PerformanceReport::compute(&values, &[], 0.0);
        // returns: 0.1, -0.1, 0.1 -> mean 1/30, sample var 0.04/3
        let expected = (0.04_f64 / 3.0).sqrt() * 252.0_f64.sqrt();
        assert_relative_eq!(report.volatility, expected, epsilon = 1e-9);
        assert_relative_eq!(
            report.sharpe_ratio,
            report.annualized_return / report.volatility,
            epsilon = 1e-12
        );
        assert!(report.sortino_ratio != 0.0);
    }

    #[test]
    fn win_rate_counts_sells_above_cost_basis() {
        let trades = vec![
            buy(100.0),
            sell(110.0, 100.0),
            buy(100.0),
            sell(95.0, 100.0),
            buy(100.0),
            sell(100.0, 100.0),
        ];
        let report = PerformanceReport::compute(&[100.0, 100.0], &trades, 0.0);
        assert_relative_eq!(report.win_rate, 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(report.total_trades, 6);
        assert_eq!(report.closed_trades, 3);
        assert_relative_eq!(report.total_commission, 6.0);
        assert_relative_eq!(report.total_slippage, 3.0);
    }

    #[test]
    fn no_sells_means_zero_win_rate() {
        let report = PerformanceReport::compute(&[100.0, 101.0], &[buy(10.0)], 0.0);
        assert_eq!(report.win_rate, 0.0);
    }

    #[test]
    fn single_value_series_is_all_zero() {
        let report = PerformanceReport::compute(&[100_000.0], &[], 0.02);
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.annualized_return, 0.0);
        assert_eq!(report.volatility, 0.0);
    }

    #[test]
    fn daily_returns_pairs() {
        let r = daily_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(r[1], -0.1, epsilon = 1e-12);
    }
}
