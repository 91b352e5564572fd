//! Blocking HTTP plumbing shared by the web providers.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use reqwest::blocking::{Client, RequestBuilder};

use super::rate_gate::RateGate;
use crate::domain::ohlcv::whole_volume;
use crate::ports::data_port::ProviderError;

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("stratsim/", env!("CARGO_PKG_VERSION"));

pub(crate) fn client(user_agent: &str) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(user_agent)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("failed to build HTTP client: {e}")))
}

/// Wait for the gate, send, and return the body of a successful response.
pub(crate) fn get_text(request: RequestBuilder, gate: &RateGate) -> Result<String, ProviderError> {
    gate.acquire();
    let response = request
        .send()
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| ProviderError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(ProviderError::from_status(status.as_u16(), snippet(&body)));
    }
    Ok(body)
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

/// Unix seconds at the first instant of `date` (UTC).
pub(crate) fn day_start(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Unix seconds at the last second of `date` (UTC).
pub(crate) fn day_end(date: NaiveDate) -> i64 {
    day_start(date) + 86_399
}

/// A JSON volume (sometimes sent as `1234.0`) as whole shares.
pub(crate) fn whole_shares(volume: f64) -> Result<u64, ProviderError> {
    whole_volume(volume).map_err(ProviderError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::BarError;

    #[test]
    fn day_bounds_cover_whole_day() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(day_start(d), 1_704_153_600);
        assert_eq!(day_end(d) - day_start(d), 86_399);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        assert_eq!(snippet(&body).len(), 203);
        assert_eq!(snippet("  short  "), "short");
    }

    #[test]
    fn non_integral_volume_is_invalid() {
        assert_eq!(whole_shares(58_414_460.0).unwrap(), 58_414_460);
        assert_eq!(
            whole_shares(1234.4),
            Err(ProviderError::InvalidData(BarError::Volume(1234.4)))
        );
        assert!(whole_shares(-1.0).is_err());
        assert!(whole_shares(f64::NAN).is_err());
    }
}
