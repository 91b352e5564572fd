//! Offline provider reading `{SYMBOL}.csv` files from a directory.
//!
//! Files carry a header row and the columns `date,open,high,low,close,volume`
//! in that order, with ISO dates. Rows outside the requested range are skipped
//! and the result is sorted by date.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::domain::ohlcv::{Bar, whole_volume};
use crate::ports::data_port::{DataPort, ProviderError};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol.to_uppercase()))
    }

    /// Symbols with a CSV file in the directory, sorted.
    pub fn list_symbols(&self) -> Result<Vec<String>, ProviderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            ProviderError::NotConfigured(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_uppercase());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, name: &str) -> Result<&'r str, ProviderError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| ProviderError::Malformed(format!("missing {name} column")))
}

fn price(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, ProviderError> {
    field(record, index, name)?
        .parse()
        .map_err(|e| ProviderError::Malformed(format!("invalid {name} value: {e}")))
}

/// Volumes are whole shares, but some exports write them as `1234.0`.
fn volume(record: &csv::StringRecord) -> Result<u64, ProviderError> {
    let raw = field(record, 5, "volume")?;
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    let v: f64 = raw
        .parse()
        .map_err(|_| ProviderError::Malformed(format!("invalid volume value: {raw}")))?;
    whole_volume(v).map_err(ProviderError::from)
}

impl DataPort for CsvAdapter {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            },
            _ => ProviderError::Malformed(format!("failed to read {}: {}", path.display(), e)),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record =
                result.map_err(|e| ProviderError::Malformed(format!("CSV parse error: {e}")))?;

            let date_str = field(&record, 0, "date")?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| ProviderError::Malformed(format!("invalid date {date_str:?}: {e}")))?;

            if date < start || date > end {
                continue;
            }

            bars.push(Bar {
                date,
                open: price(&record, 1, "open")?,
                high: price(&record, 2, "high")?,
                low: price(&record, 3, "low")?,
                close: price(&record, 4, "close")?,
                volume: volume(&record)?,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}
