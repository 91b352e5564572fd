//! Yahoo Finance v8 chart provider.
//!
//! Unofficial and unauthenticated, so it sits last in the default chain.
//! Rows where any price is null (holidays, halted days) are dropped.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::http;
use super::rate_gate::RateGate;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::{DataPort, ProviderError};

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

pub struct YahooAdapter {
    client: Client,
    gate: Arc<RateGate>,
    base_url: String,
}

impl YahooAdapter {
    pub fn new(gate: Arc<RateGate>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::client(BROWSER_USER_AGENT)?,
            gate,
            base_url: CHART_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn at(series: &[Option<f64>], i: usize) -> Option<f64> {
    series.get(i).copied().flatten()
}

fn parse_response(
    symbol: &str,
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Bar>, ProviderError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("chart: {e}")))?;

    let result = match (response.chart.result, response.chart.error) {
        (Some(result), _) => result,
        (None, Some(err)) if err.code == "Not Found" => {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        (None, Some(err)) => {
            return Err(ProviderError::Malformed(format!(
                "{}: {}",
                err.code, err.description
            )));
        }
        (None, None) => return Err(ProviderError::Malformed("empty result with no error".into())),
    };

    let Some(data) = result.into_iter().next() else {
        return Ok(Vec::new());
    };
    // No timestamps means no trading days in range.
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("no quote data".into()))?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| ProviderError::Malformed(format!("invalid timestamp {ts}")))?;
        if date < start || date > end {
            continue;
        }
        let (Some(open), Some(high), Some(low), Some(close)) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        ) else {
            continue;
        };
        bars.push(Bar {
            date,
            open,
            high,
            low,
            close,
            volume: http::whole_shares(at(&quote.volume, i).unwrap_or(0.0))?,
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

impl DataPort for YahooAdapter {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        let period1 = http::day_start(start).to_string();
        let period2 = http::day_end(end).to_string();
        let url = format!("{}/{}", self.base_url, symbol);
        let request = self.client.get(url).query(&[
            ("period1", period1.as_str()),
            ("period2", period2.as_str()),
            ("interval", "1d"),
        ]);
        let body = http::get_text(request, &self.gate)?;
        parse_response(symbol, &body, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn parses_chart_and_skips_null_rows() {
        // 2024-01-02, 2024-01-03, 2024-01-04 at 14:30 UTC
        let body = r#"{"chart": {"result": [{
            "timestamp": [1704205800, 1704292200, 1704378600],
            "indicators": {"quote": [{
                "open":   [187.15, null, 182.15],
                "high":   [188.44, null, 183.09],
                "low":    [183.89, null, 180.88],
                "close":  [185.64, null, 181.91],
                "volume": [82488700, null, 71983600]
            }]}
        }], "error": null}}"#;
        let bars = parse_response("AAPL", body, d(1, 1), d(1, 31)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d(1, 2));
        assert_eq!(bars[1].date, d(1, 4));
        assert_eq!(bars[1].volume, 71_983_600);
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let body = r#"{"chart": {"result": null,
            "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let err = parse_response("ZZZZ", body, d(1, 1), d(1, 31)).unwrap_err();
        assert_eq!(
            err,
            ProviderError::SymbolNotFound {
                symbol: "ZZZZ".into()
            }
        );
    }

    #[test]
    fn missing_timestamps_is_empty() {
        let body = r#"{"chart": {"result": [{"indicators": {"quote": [{}]}}], "error": null}}"#;
        let bars = parse_response("AAPL", body, d(1, 1), d(1, 31)).unwrap();
        assert!(bars.is_empty());
    }
}
