//! Multi-provider historical data retrieval with retry and fallback.
//!
//! Providers are tried in priority order. Each one gets up to
//! `max_retries` attempts for transient failures, sleeping
//! `retry_delay × retry_backoff^attempt` in between. Empty or invalid
//! series fall through to the next provider immediately.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::bar_cache::{BarCache, CacheKey};
use super::ohlcv::{Bar, validate_series};
use crate::ports::data_port::{DataPort, ProviderError};

/// Longest sleep between two attempts, whatever the backoff settings.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per provider, including the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retry_backoff: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_retries: u32) -> Self {
        RetryPolicy {
            max_retries,
            retry_delay: Duration::ZERO,
            retry_backoff: 1.0,
        }
    }

    /// Sleep after the failed attempt numbered `attempt` (0-based), capped
    /// at [`MAX_RETRY_DELAY`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.retry_delay.is_zero() {
            return Duration::ZERO;
        }
        let secs = self.retry_delay.as_secs_f64() * self.retry_backoff.powf(f64::from(attempt));
        Duration::try_from_secs_f64(secs).map_or(MAX_RETRY_DELAY, |d| d.min(MAX_RETRY_DELAY))
    }
}

/// Which providers a request may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    Auto,
    Named(String),
}

impl SourceSelection {
    pub fn parse(source: &str) -> Self {
        let source = source.trim().to_ascii_lowercase();
        if source.is_empty() || source == "auto" {
            SourceSelection::Auto
        } else {
            SourceSelection::Named(source)
        }
    }

    fn label(&self) -> &str {
        match self {
            SourceSelection::Auto => "auto",
            SourceSelection::Named(name) => name,
        }
    }
}

impl fmt::Display for SourceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One provider that did not deliver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub provider: String,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("all data sources exhausted for {symbol} ({} tried)", .failures.len())]
pub struct AllSourcesExhausted {
    pub symbol: String,
    pub failures: Vec<SourceFailure>,
}

/// A validated series and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedBars {
    pub provider: String,
    pub bars: Vec<Bar>,
    /// Providers that failed before this one succeeded.
    pub failures: Vec<SourceFailure>,
    pub from_cache: bool,
}

pub struct DataSourceManager {
    providers: Vec<Arc<dyn DataPort>>,
    retry: RetryPolicy,
    cache: Arc<BarCache>,
}

impl fmt::Debug for DataSourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceManager")
            .field("providers", &self.provider_names())
            .field("retry", &self.retry)
            .field("cache", &self.cache)
            .finish()
    }
}

impl DataSourceManager {
    pub fn new(providers: Vec<Arc<dyn DataPort>>, retry: RetryPolicy, cache: BarCache) -> Self {
        Self::with_shared_cache(providers, retry, Arc::new(cache))
    }

    /// A manager whose cache is also handed to other managers, so runs over
    /// the same series fetch it once.
    pub fn with_shared_cache(
        providers: Vec<Arc<dyn DataPort>>,
        retry: RetryPolicy,
        cache: Arc<BarCache>,
    ) -> Self {
        DataSourceManager {
            providers,
            retry,
            cache,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn cache(&self) -> &BarCache {
        &self.cache
    }

    /// Bars for `symbol`, or `None` once every eligible provider has failed.
    pub fn get_historical_data(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        source: &str,
    ) -> Option<Vec<Bar>> {
        self.fetch(symbol, start, end, &SourceSelection::parse(source))
            .ok()
            .map(|sourced| sourced.bars)
    }

    /// Like [`get_historical_data`](Self::get_historical_data) but keeps the
    /// provenance and the per-provider failure record.
    pub fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        selection: &SourceSelection,
    ) -> Result<SourcedBars, AllSourcesExhausted> {
        let key = CacheKey {
            symbol: symbol.to_string(),
            start,
            end,
            source: selection.label().to_string(),
        };
        if let Some((provider, bars)) = self.cache.get(&key) {
            debug!(symbol, provider = %provider, "bar cache hit");
            return Ok(SourcedBars {
                provider,
                bars,
                failures: Vec::new(),
                from_cache: true,
            });
        }

        let candidates: Vec<&Arc<dyn DataPort>> = match selection {
            SourceSelection::Auto => self.providers.iter().collect(),
            SourceSelection::Named(name) => {
                self.providers.iter().filter(|p| p.name() == name).collect()
            }
        };

        let mut failures = Vec::new();
        if candidates.is_empty() {
            failures.push(SourceFailure {
                provider: selection.label().to_string(),
                attempts: 0,
                error: ProviderError::NotConfigured(selection.label().to_string()).to_string(),
            });
        }

        for provider in candidates {
            match self.try_provider(provider.as_ref(), symbol, start, end) {
                Ok(bars) => {
                    info!(
                        symbol,
                        provider = provider.name(),
                        bars = bars.len(),
                        "loaded historical data"
                    );
                    self.cache.insert(key, provider.name(), bars.clone());
                    return Ok(SourcedBars {
                        provider: provider.name().to_string(),
                        bars,
                        failures,
                        from_cache: false,
                    });
                }
                Err((attempts, error)) => {
                    warn!(
                        symbol,
                        provider = provider.name(),
                        attempts,
                        error = %error,
                        "provider failed, falling back"
                    );
                    failures.push(SourceFailure {
                        provider: provider.name().to_string(),
                        attempts,
                        error: error.to_string(),
                    });
                }
            }
        }

        warn!(symbol, tried = failures.len(), "all data sources exhausted");
        Err(AllSourcesExhausted {
            symbol: symbol.to_string(),
            failures,
        })
    }

    fn try_provider(
        &self,
        provider: &dyn DataPort,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, (u32, ProviderError)> {
        let max_attempts = self.retry.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match provider.fetch_bars(symbol, start, end) {
                Ok(bars) if bars.is_empty() => ProviderError::Empty,
                Ok(bars) => {
                    return validate_series(&bars)
                        .map(|()| bars)
                        .map_err(|e| (attempt, ProviderError::InvalidData(e)));
                }
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err((attempt, error));
            }

            let delay = self.retry.delay_for(attempt - 1);
            warn!(
                symbol,
                provider = provider.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient provider failure, retrying"
            );
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Scripted {
        name: &'static str,
        calls: AtomicU32,
        responses: Mutex<Vec<Result<Vec<Bar>, ProviderError>>>,
    }

    impl Scripted {
        /// Responses are served in order; the last one repeats.
        fn new(name: &'static str, responses: Vec<Result<Vec<Bar>, ProviderError>>) -> Arc<Self> {
            Arc::new(Scripted {
                name,
                calls: AtomicU32::new(0),
                responses: Mutex::new(responses),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DataPort for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn fetch_bars(&self, _: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<Bar>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }
    }

    fn bars(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| Bar {
                date: start + chrono::Duration::days(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 10_000,
            })
            .collect()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn manager(providers: Vec<Arc<dyn DataPort>>, retries: u32) -> DataSourceManager {
        DataSourceManager::new(providers, RetryPolicy::no_delay(retries), BarCache::disabled())
    }

    #[test]
    fn falls_back_past_empty_and_error() {
        let a = Scripted::new("a", vec![Ok(Vec::new())]);
        let b = Scripted::new("b", vec![Err(ProviderError::Malformed("boom".into()))]);
        let c = Scripted::new("c", vec![Ok(bars(30))]);
        let mgr = manager(vec![a.clone(), b.clone(), c.clone()], 3);

        let sourced = mgr.fetch("AAPL", d(1), d(31), &SourceSelection::Auto).unwrap();
        assert_eq!(sourced.bars.len(), 30);
        assert_eq!(sourced.provider, "c");
        assert_eq!(sourced.failures.len(), 2);
        assert_eq!(sourced.failures[0].provider, "a");
        assert_eq!(sourced.failures[1].provider, "b");
        // neither failure is transient, so each provider was called once
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[test]
    fn transient_errors_retry_until_success() {
        let flaky = Scripted::new(
            "flaky",
            vec![
                Err(ProviderError::Transport("reset".into())),
                Err(ProviderError::from_status(502, "bad gateway")),
                Ok(bars(5)),
            ],
        );
        let mgr = manager(vec![flaky.clone()], 3);
        let sourced = mgr.fetch("AAPL", d(1), d(5), &SourceSelection::Auto).unwrap();
        assert_eq!(sourced.bars.len(), 5);
        assert_eq!(flaky.calls(), 3);
    }

    #[test]
    fn retries_exhaust_then_fall_back() {
        let down = Scripted::new("down", vec![Err(ProviderError::Transport("refused".into()))]);
        let backup = Scripted::new("backup", vec![Ok(bars(3))]);
        let mgr = manager(vec![down.clone(), backup], 2);

        let sourced = mgr.fetch("AAPL", d(1), d(3), &SourceSelection::Auto).unwrap();
        assert_eq!(down.calls(), 2);
        assert_eq!(sourced.failures[0].attempts, 2);
        assert_eq!(sourced.provider, "backup");
    }

    #[test]
    fn all_failing_reports_every_provider() {
        let a = Scripted::new("a", vec![Ok(Vec::new())]);
        let b = Scripted::new("b", vec![Err(ProviderError::Transport("down".into()))]);
        let mgr = manager(vec![a, b], 3);

        let err = mgr.fetch("AAPL", d(1), d(2), &SourceSelection::Auto).unwrap_err();
        assert_eq!(err.symbol, "AAPL");
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[1].attempts, 3);
        assert!(mgr.get_historical_data("AAPL", d(1), d(2), "auto").is_none());
    }

    #[test]
    fn invalid_series_rejected_not_coerced() {
        let mut bad = bars(3);
        bad.swap(0, 2);
        let a = Scripted::new("a", vec![Ok(bad)]);
        let mgr = manager(vec![a.clone()], 3);

        let err = mgr.fetch("AAPL", d(1), d(3), &SourceSelection::Auto).unwrap_err();
        assert!(err.failures[0].error.starts_with("invalid bars"));
        assert_eq!(a.calls(), 1);
    }

    #[test]
    fn named_source_only_tries_that_provider() {
        let a = Scripted::new("a", vec![Ok(bars(2))]);
        let b = Scripted::new("b", vec![Ok(bars(4))]);
        let mgr = manager(vec![a.clone(), b], 1);

        let got = mgr.get_historical_data("AAPL", d(1), d(4), "b").unwrap();
        assert_eq!(got.len(), 4);
        assert_eq!(a.calls(), 0);

        let err = mgr
            .fetch("AAPL", d(1), d(4), &SourceSelection::parse("nope"))
            .unwrap_err();
        assert_eq!(err.failures[0].attempts, 0);
    }

    #[test]
    fn cache_serves_repeat_requests() {
        let a = Scripted::new("a", vec![Ok(bars(2))]);
        let mgr = DataSourceManager::new(
            vec![a.clone()],
            RetryPolicy::no_delay(1),
            BarCache::new(Duration::from_secs(60), 8),
        );

        mgr.fetch("AAPL", d(1), d(2), &SourceSelection::Auto).unwrap();
        let second = mgr.fetch("AAPL", d(1), d(2), &SourceSelection::Auto).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.provider, "a");
        assert_eq!(a.calls(), 1);
    }

    #[test]
    fn backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn huge_backoff_is_capped_not_overflowed() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            retry_delay: Duration::from_secs(30),
            retry_backoff: 1e6,
        };
        assert_eq!(policy.delay_for(u32::MAX - 1), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_for(40), MAX_RETRY_DELAY);

        let instant = RetryPolicy {
            retry_delay: Duration::ZERO,
            ..policy
        };
        assert_eq!(instant.delay_for(u32::MAX - 1), Duration::ZERO);
    }

    #[test]
    fn selection_parsing() {
        assert_eq!(SourceSelection::parse("AUTO"), SourceSelection::Auto);
        assert_eq!(SourceSelection::parse(""), SourceSelection::Auto);
        assert_eq!(
            SourceSelection::parse("Yahoo"),
            SourceSelection::Named("yahoo".into())
        );
    }
}
