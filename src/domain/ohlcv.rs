//! OHLCV bar representation and series validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::BarError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Check a single bar: finite positive prices and `low <= open,close <= high`.
    pub fn check(&self) -> Result<(), BarError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(BarError::Price {
                date: self.date,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return Err(BarError::Range {
                date: self.date,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        Ok(())
    }
}

/// Convert a volume delivered as a float into whole shares. Fractional,
/// negative and non-finite values are rejected, never rounded.
pub fn whole_volume(volume: f64) -> Result<u64, BarError> {
    if volume.is_finite() && volume >= 0.0 && volume.fract() == 0.0 && volume < u64::MAX as f64 {
        Ok(volume as u64)
    } else {
        Err(BarError::Volume(volume))
    }
}

/// Validate a whole series: every bar passes [`Bar::check`] and dates are
/// strictly increasing.
pub fn validate_series(bars: &[Bar]) -> Result<(), BarError> {
    for bar in bars {
        bar.check()?;
    }
    for pair in bars.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(BarError::Order {
                previous: pair[0].date,
                next: pair[1].date,
            });
        }
    }
    Ok(())
}

/// Closing prices of a series, in order.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Volumes of a series as f64, in order.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open,
            high,
            low,
            close,
            volume: 50_000,
        }
    }

    #[test]
    fn well_formed_bar_passes() {
        assert!(bar(15, 100.0, 110.0, 90.0, 105.0).check().is_ok());
    }

    #[test]
    fn close_above_high_rejected() {
        assert!(matches!(
            bar(15, 100.0, 110.0, 90.0, 111.0).check(),
            Err(BarError::Range { .. })
        ));
    }

    #[test]
    fn open_below_low_rejected() {
        assert!(bar(15, 89.0, 110.0, 90.0, 100.0).check().is_err());
    }

    #[test]
    fn nan_price_rejected() {
        assert!(bar(15, f64::NAN, 110.0, 90.0, 100.0).check().is_err());
    }

    #[test]
    fn zero_price_rejected() {
        assert!(matches!(
            bar(15, 0.0, 0.0, 0.0, 0.0).check(),
            Err(BarError::Price { .. })
        ));
    }

    #[test]
    fn whole_volume_accepts_integral_floats_only() {
        assert_eq!(whole_volume(1500.0).unwrap(), 1500);
        assert_eq!(whole_volume(1e3).unwrap(), 1000);
        assert_eq!(whole_volume(0.0).unwrap(), 0);
        assert_eq!(whole_volume(1234.4), Err(BarError::Volume(1234.4)));
        assert!(whole_volume(-1.0).is_err());
        assert!(whole_volume(f64::NAN).is_err());
        assert!(whole_volume(f64::INFINITY).is_err());
    }

    #[test]
    fn series_with_duplicate_date_rejected() {
        let bars = vec![
            bar(15, 100.0, 110.0, 90.0, 105.0),
            bar(15, 100.0, 110.0, 90.0, 105.0),
        ];
        let err = validate_series(&bars).unwrap_err();
        assert!(matches!(err, BarError::Order { .. }));
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn series_out_of_order_rejected() {
        let bars = vec![
            bar(16, 100.0, 110.0, 90.0, 105.0),
            bar(15, 100.0, 110.0, 90.0, 105.0),
        ];
        assert!(validate_series(&bars).is_err());
    }

    #[test]
    fn ordered_series_passes() {
        let bars = vec![
            bar(15, 100.0, 110.0, 90.0, 105.0),
            bar(16, 105.0, 115.0, 100.0, 110.0),
        ];
        assert!(validate_series(&bars).is_ok());
        assert_eq!(closes(&bars), vec![105.0, 110.0]);
        assert_eq!(volumes(&bars), vec![50_000.0, 50_000.0]);
    }
}
