//! Alpha Vantage `TIME_SERIES_DAILY` provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::http;
use super::rate_gate::RateGate;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::{DataPort, ProviderError};

const QUERY_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage reports failures inside a 200 response.
#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<BTreeMap<String, DailyRow>>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyRow {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

pub struct AlphaVantageAdapter {
    client: Client,
    gate: Arc<RateGate>,
    api_key: Option<String>,
    base_url: String,
}

impl AlphaVantageAdapter {
    pub fn new(api_key: Option<String>, gate: Arc<RateGate>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::client(http::DEFAULT_USER_AGENT)?,
            gate,
            api_key,
            base_url: QUERY_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn number(raw: &str, date: &str, name: &str) -> Result<f64, ProviderError> {
    raw.trim()
        .parse()
        .map_err(|_| ProviderError::Malformed(format!("{date}: invalid {name} {raw:?}")))
}

fn parse_response(
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Bar>, ProviderError> {
    let response: DailyResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("daily series: {e}")))?;

    if let Some(message) = response.error_message {
        return Err(ProviderError::Malformed(message));
    }
    if let Some(message) = response.note.or(response.information) {
        return Err(ProviderError::RateLimited(message));
    }
    let series = response
        .series
        .ok_or_else(|| ProviderError::Malformed("missing \"Time Series (Daily)\"".into()))?;

    let mut bars = Vec::new();
    for (day, row) in &series {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|e| ProviderError::Malformed(format!("invalid date {day:?}: {e}")))?;
        if date < start || date > end {
            continue;
        }
        bars.push(Bar {
            date,
            open: number(&row.open, day, "open")?,
            high: number(&row.high, day, "high")?,
            low: number(&row.low, day, "low")?,
            close: number(&row.close, day, "close")?,
            volume: http::whole_shares(number(&row.volume, day, "volume")?)?,
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

impl DataPort for AlphaVantageAdapter {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("alpha_vantage_key is not set".into()))?;

        let request = self.client.get(&self.base_url).query(&[
            ("function", "TIME_SERIES_DAILY"),
            ("symbol", symbol),
            ("outputsize", "full"),
            ("apikey", api_key),
        ]);
        let body = http::get_text(request, &self.gate)?;
        parse_response(&body, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn parses_daily_series_ascending() {
        let body = r#"{
            "Meta Data": {"2. Symbol": "IBM"},
            "Time Series (Daily)": {
                "2024-01-03": {"1. open": "161.0", "2. high": "161.73", "3. low": "160.08",
                               "4. close": "160.10", "5. volume": "4086980"},
                "2024-01-02": {"1. open": "162.83", "2. high": "163.29", "3. low": "160.38",
                               "4. close": "161.50", "5. volume": "3825045"}
            }
        }"#;
        let bars = parse_response(body, d(1, 1), d(1, 31)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, d(1, 2));
        assert_eq!(bars[0].open, 162.83);
        assert_eq!(bars[1].volume, 4_086_980);
    }

    #[test]
    fn note_means_rate_limited() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"}"#;
        let err = parse_response(body, d(1, 1), d(1, 31)).unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn error_message_is_not_retried() {
        let body = r#"{"Error Message": "Invalid API call."}"#;
        let err = parse_response(body, d(1, 1), d(1, 31)).unwrap_err();
        assert_eq!(err, ProviderError::Malformed("Invalid API call.".into()));
    }

    #[test]
    fn bad_number_is_malformed() {
        let body = r#"{"Time Series (Daily)": {"2024-01-02": {"1. open": "n/a",
            "2. high": "1", "3. low": "1", "4. close": "1", "5. volume": "1"}}}"#;
        assert!(matches!(
            parse_response(body, d(1, 1), d(1, 31)),
            Err(ProviderError::Malformed(_))
        ));
    }
}
