//! Typed engine configuration built from a [`ConfigPort`].
//!
//! Sections: `[engine]` for capital, costs and sizing, `[data]` for the
//! provider chain, retries and cache, `[run]` for what to backtest. Every
//! key has a default except the run dates.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use super::data_source::RetryPolicy;
use super::error::{StratsimError, VolumeConfigError};
use super::execution::ExecutionSimulator;
use super::sizing::PositionSizer;
use super::strategy::{self, Strategy, VolumeBaselineStrategy};
use super::volume::VolumeBaselineAnalyzer;
use crate::ports::config_port::ConfigPort;

const ENGINE: &str = "engine";
const DATA: &str = "data";
const RUN: &str = "run";
const STRATEGY: &str = "strategy";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub commission_per_trade: f64,
    /// Percent of the reference price (0.1 = 0.1 %).
    pub slippage_percent: f64,
    pub min_position_size: f64,
    pub max_position_size: f64,
    pub default_risk_fraction: f64,
    pub risk_free_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            initial_capital: 100_000.0,
            commission_per_trade: 0.0,
            slippage_percent: 0.1,
            min_position_size: 0.05,
            max_position_size: 0.20,
            default_risk_fraction: 0.1,
            risk_free_rate: 0.02,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratsimError> {
        let d = EngineConfig::default();
        let engine = EngineConfig {
            initial_capital: get_f64(config, ENGINE, "initial_capital", d.initial_capital)?,
            commission_per_trade: get_f64(
                config,
                ENGINE,
                "commission_per_trade",
                d.commission_per_trade,
            )?,
            slippage_percent: get_f64(config, ENGINE, "slippage_percent", d.slippage_percent)?,
            min_position_size: get_f64(config, ENGINE, "min_position_size", d.min_position_size)?,
            max_position_size: get_f64(config, ENGINE, "max_position_size", d.max_position_size)?,
            default_risk_fraction: get_f64(
                config,
                ENGINE,
                "default_risk_fraction",
                d.default_risk_fraction,
            )?,
            risk_free_rate: get_f64(config, ENGINE, "risk_free_rate", d.risk_free_rate)?,
        };
        engine.validate()?;
        Ok(engine)
    }

    pub fn validate(&self) -> Result<(), StratsimError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(StratsimError::invalid(
                ENGINE,
                "initial_capital",
                "must be positive",
            ));
        }
        non_negative(self.commission_per_trade, ENGINE, "commission_per_trade")?;
        non_negative(self.slippage_percent, ENGINE, "slippage_percent")?;
        if self.slippage_percent >= 100.0 {
            return Err(StratsimError::invalid(
                ENGINE,
                "slippage_percent",
                "must be below 100",
            ));
        }
        fraction(self.min_position_size, ENGINE, "min_position_size")?;
        fraction(self.max_position_size, ENGINE, "max_position_size")?;
        if self.min_position_size > self.max_position_size {
            return Err(StratsimError::invalid(
                ENGINE,
                "min_position_size",
                "must not exceed max_position_size",
            ));
        }
        fraction(self.default_risk_fraction, ENGINE, "default_risk_fraction")?;
        if !self.risk_free_rate.is_finite() {
            return Err(StratsimError::invalid(
                ENGINE,
                "risk_free_rate",
                "must be finite",
            ));
        }
        Ok(())
    }

    pub fn sizer(&self) -> PositionSizer {
        PositionSizer::new(
            self.min_position_size,
            self.max_position_size,
            self.default_risk_fraction,
        )
    }

    pub fn simulator(&self) -> ExecutionSimulator {
        ExecutionSimulator::new(self.commission_per_trade, self.slippage_percent)
    }
}

/// Provider chain, retry, cache and credential settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    /// Provider names in priority order.
    pub providers: Vec<String>,
    pub csv_dir: Option<PathBuf>,
    pub schwab_token: Option<String>,
    pub alpha_vantage_key: Option<String>,
    /// Requests per minute allowed to each HTTP provider.
    pub schwab_per_minute: u32,
    pub alpha_vantage_per_minute: u32,
    pub yahoo_per_minute: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: 128,
            providers: vec![
                "schwab".to_string(),
                "alpha_vantage".to_string(),
                "yahoo".to_string(),
            ],
            csv_dir: None,
            schwab_token: None,
            alpha_vantage_key: None,
            schwab_per_minute: 120,
            alpha_vantage_per_minute: 5,
            yahoo_per_minute: 60,
        }
    }
}

impl DataConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratsimError> {
        let d = DataConfig::default();

        let max_retries = get_u64(config, DATA, "max_retries", d.retry.max_retries as u64)?;
        if max_retries == 0 || max_retries > u32::MAX as u64 {
            return Err(StratsimError::invalid(DATA, "max_retries", "must be at least 1"));
        }
        let delay_ms = get_u64(
            config,
            DATA,
            "retry_delay_ms",
            d.retry.retry_delay.as_millis() as u64,
        )?;
        let retry_backoff = get_f64(config, DATA, "retry_backoff", d.retry.retry_backoff)?;
        if !(retry_backoff.is_finite() && retry_backoff >= 1.0) {
            return Err(StratsimError::invalid(DATA, "retry_backoff", "must be >= 1.0"));
        }

        let cache_ttl_secs = get_u64(config, DATA, "cache_ttl_secs", d.cache_ttl.as_secs())?;
        let cache_max_entries =
            get_u64(config, DATA, "cache_max_entries", d.cache_max_entries as u64)? as usize;

        let providers = match config.get_string(DATA, "providers") {
            Some(list) => parse_list(&list)
                .into_iter()
                .map(|name| name.to_lowercase())
                .collect(),
            None => d.providers,
        };
        if providers.is_empty() {
            return Err(StratsimError::invalid(DATA, "providers", "list is empty"));
        }

        Ok(DataConfig {
            retry: RetryPolicy {
                max_retries: max_retries as u32,
                retry_delay: Duration::from_millis(delay_ms),
                retry_backoff,
            },
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache_max_entries,
            providers,
            csv_dir: non_empty(config.get_string(DATA, "csv_dir")).map(PathBuf::from),
            schwab_token: non_empty(config.get_string(DATA, "schwab_token")),
            alpha_vantage_key: non_empty(config.get_string(DATA, "alpha_vantage_key")),
            schwab_per_minute: per_minute(config, "schwab_per_minute", d.schwab_per_minute)?,
            alpha_vantage_per_minute: per_minute(
                config,
                "alpha_vantage_per_minute",
                d.alpha_vantage_per_minute,
            )?,
            yahoo_per_minute: per_minute(config, "yahoo_per_minute", d.yahoo_per_minute)?,
        })
    }
}

/// What a single backtest invocation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub symbols: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub strategy: String,
    /// `auto` or a single provider name.
    pub source: String,
    /// Run symbols on the rayon pool rather than one after another.
    pub parallel: bool,
}

impl RunConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratsimError> {
        let symbols = config
            .get_string(RUN, "symbols")
            .map(|s| parse_list(&s).into_iter().map(|s| s.to_uppercase()).collect())
            .unwrap_or_default();

        let start_date = get_date(config, RUN, "start_date")?;
        let end_date = get_date(config, RUN, "end_date")?;
        if end_date < start_date {
            return Err(StratsimError::invalid(
                RUN,
                "end_date",
                "end_date must not precede start_date",
            ));
        }

        Ok(RunConfig {
            symbols,
            start_date,
            end_date,
            strategy: non_empty(config.get_string(RUN, "strategy"))
                .unwrap_or_else(|| "volume_breakout".to_string()),
            source: non_empty(config.get_string(RUN, "source")).unwrap_or_else(|| "auto".to_string()),
            parallel: config.get_bool(RUN, "parallel", true),
        })
    }
}

/// Tuning for the built-in strategies. Unparseable values fall back to
/// the defaults; out-of-range values are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub volume_lookback_days: usize,
    pub volume_unusual_threshold: f64,
    /// Risk fraction attached to the volume-baseline strategy's buys.
    pub risk_fraction: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            volume_lookback_days: 30,
            volume_unusual_threshold: 1.15,
            risk_fraction: 0.1,
        }
    }
}

impl StrategyConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratsimError> {
        let d = StrategyConfig::default();
        let lookback = config.get_int(STRATEGY, "volume_lookback_days", d.volume_lookback_days as i64);
        if lookback <= 0 {
            return Err(StratsimError::invalid(
                STRATEGY,
                "volume_lookback_days",
                "must be positive",
            ));
        }
        let strategy = StrategyConfig {
            volume_lookback_days: lookback as usize,
            volume_unusual_threshold: config.get_double(
                STRATEGY,
                "volume_unusual_threshold",
                d.volume_unusual_threshold,
            ),
            risk_fraction: config.get_double(STRATEGY, "risk_fraction", d.risk_fraction),
        };
        fraction(strategy.risk_fraction, STRATEGY, "risk_fraction")?;
        strategy.analyzer()?;
        Ok(strategy)
    }

    fn analyzer(&self) -> Result<VolumeBaselineAnalyzer, StratsimError> {
        VolumeBaselineAnalyzer::new(self.volume_lookback_days, self.volume_unusual_threshold)
            .map_err(|e| {
                let key = match e {
                    VolumeConfigError::Lookback { .. } => "volume_lookback_days",
                    VolumeConfigError::Threshold(_) => "volume_unusual_threshold",
                };
                StratsimError::invalid(STRATEGY, key, e.to_string())
            })
    }

    /// A fresh instance of the named built-in strategy.
    pub fn build(&self, name: &str) -> Option<Box<dyn Strategy>> {
        match name {
            "volume_baseline" => {
                let analyzer = self.analyzer().ok()?;
                Some(Box::new(VolumeBaselineStrategy::new(
                    analyzer,
                    self.risk_fraction,
                )))
            }
            other => strategy::builtin(other),
        }
    }
}

fn get_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, StratsimError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| StratsimError::invalid(section, key, format!("'{raw}' is not a number"))),
    }
}

fn get_u64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: u64,
) -> Result<u64, StratsimError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            StratsimError::invalid(section, key, format!("'{raw}' is not a non-negative integer"))
        }),
    }
}

fn get_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, StratsimError> {
    let raw = config
        .get_string(section, key)
        .ok_or_else(|| StratsimError::missing(section, key))?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        StratsimError::invalid(section, key, format!("'{raw}' is not YYYY-MM-DD: {e}"))
    })
}

fn per_minute(config: &dyn ConfigPort, key: &str, default: u32) -> Result<u32, StratsimError> {
    let value = get_u64(config, DATA, key, default as u64)?;
    if value == 0 || value > u32::MAX as u64 {
        return Err(StratsimError::invalid(DATA, key, "must be at least 1"));
    }
    Ok(value as u32)
}

fn non_negative(value: f64, section: &str, key: &str) -> Result<(), StratsimError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(StratsimError::invalid(section, key, "must be non-negative"));
    }
    Ok(())
}

fn fraction(value: f64, section: &str, key: &str) -> Result<(), StratsimError> {
    if !(value.is_finite() && value > 0.0 && value <= 1.0) {
        return Err(StratsimError::invalid(section, key, "must be in (0, 1]"));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
