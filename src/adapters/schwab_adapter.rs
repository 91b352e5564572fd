//! Schwab market data `pricehistory` provider.
//!
//! Requires an OAuth access token obtained out of band. Without one every
//! request fails with [`ProviderError::NotConfigured`] so the manager falls
//! through to the next source.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::http;
use super::rate_gate::RateGate;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::{DataPort, ProviderError};

const PRICE_HISTORY_URL: &str = "https://api.schwabapi.com/marketdata/v1/pricehistory";

#[derive(Debug, Deserialize)]
struct PriceHistory {
    #[serde(default)]
    candles: Vec<Candle>,
    #[serde(default)]
    empty: bool,
}

#[derive(Debug, Deserialize)]
struct Candle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    /// Epoch milliseconds.
    datetime: i64,
}

pub struct SchwabAdapter {
    client: Client,
    gate: Arc<RateGate>,
    token: Option<String>,
    base_url: String,
}

impl SchwabAdapter {
    pub fn new(token: Option<String>, gate: Arc<RateGate>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http::client(http::DEFAULT_USER_AGENT)?,
            gate,
            token,
            base_url: PRICE_HISTORY_URL.to_string(),
        })
    }

    /// Point at a different endpoint, e.g. a local stub server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn parse_response(
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Bar>, ProviderError> {
    let history: PriceHistory = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("pricehistory: {e}")))?;
    if history.empty {
        return Ok(Vec::new());
    }

    let mut bars = Vec::with_capacity(history.candles.len());
    for candle in history.candles {
        let date = DateTime::from_timestamp_millis(candle.datetime)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| {
                ProviderError::Malformed(format!("invalid candle datetime {}", candle.datetime))
            })?;
        if date < start || date > end {
            continue;
        }
        bars.push(Bar {
            date,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: http::whole_shares(candle.volume)?,
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

impl DataPort for SchwabAdapter {
    fn name(&self) -> &str {
        "schwab"
    }

    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("schwab_token is not set".into()))?;

        let start_ms = (http::day_start(start) * 1000).to_string();
        let end_ms = (http::day_end(end) * 1000).to_string();
        let request = self.client.get(&self.base_url).bearer_auth(token).query(&[
            ("symbol", symbol),
            ("periodType", "year"),
            ("frequencyType", "daily"),
            ("frequency", "1"),
            ("startDate", start_ms.as_str()),
            ("endDate", end_ms.as_str()),
            ("needExtendedHoursData", "false"),
        ]);

        let body = http::get_text(request, &self.gate)?;
        parse_response(&body, start, end)
    }
}
