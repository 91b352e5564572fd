//! Concrete adapter implementations for ports.

#[cfg(feature = "http")]
pub mod alpha_vantage_adapter;
pub mod csv_adapter;
pub mod file_config_adapter;
#[cfg(feature = "http")]
mod http;
pub mod rate_gate;
#[cfg(feature = "http")]
pub mod schwab_adapter;
#[cfg(feature = "http")]
pub mod yahoo_adapter;

use std::sync::Arc;

use crate::domain::config::DataConfig;
use crate::domain::error::StratsimError;
use crate::ports::data_port::DataPort;

use self::csv_adapter::CsvAdapter;

/// Names accepted in `[data] providers`.
pub const PROVIDER_NAMES: [&str; 4] = ["schwab", "alpha_vantage", "yahoo", "csv"];

/// Build the provider chain in the configured order. Each HTTP provider gets
/// its own rate gate, shared by every run that clones the returned `Arc`s.
pub fn build_providers(config: &DataConfig) -> Result<Vec<Arc<dyn DataPort>>, StratsimError> {
    let mut providers: Vec<Arc<dyn DataPort>> = Vec::with_capacity(config.providers.len());
    for name in &config.providers {
        if providers.iter().any(|p| p.name() == name) {
            return Err(StratsimError::invalid(
                "data",
                "providers",
                format!("'{name}' listed twice"),
            ));
        }
        providers.push(build_provider(name, config)?);
    }
    Ok(providers)
}

fn build_provider(name: &str, config: &DataConfig) -> Result<Arc<dyn DataPort>, StratsimError> {
    match name {
        "csv" => {
            let dir = config
                .csv_dir
                .clone()
                .ok_or_else(|| StratsimError::missing("data", "csv_dir"))?;
            Ok(Arc::new(CsvAdapter::new(dir)))
        }
        "schwab" | "alpha_vantage" | "yahoo" => build_http_provider(name, config),
        other => Err(StratsimError::invalid(
            "data",
            "providers",
            format!(
                "unknown provider '{other}' (expected one of {})",
                PROVIDER_NAMES.join(", ")
            ),
        )),
    }
}

#[cfg(feature = "http")]
fn build_http_provider(name: &str, config: &DataConfig) -> Result<Arc<dyn DataPort>, StratsimError> {
    use self::alpha_vantage_adapter::AlphaVantageAdapter;
    use self::rate_gate::RateGate;
    use self::schwab_adapter::SchwabAdapter;
    use self::yahoo_adapter::YahooAdapter;

    let built: Result<Arc<dyn DataPort>, _> = match name {
        "schwab" => SchwabAdapter::new(
            config.schwab_token.clone(),
            Arc::new(RateGate::per_minute(config.schwab_per_minute)),
        )
        .map(|a| Arc::new(a) as Arc<dyn DataPort>),
        "alpha_vantage" => AlphaVantageAdapter::new(
            config.alpha_vantage_key.clone(),
            Arc::new(RateGate::per_minute(config.alpha_vantage_per_minute)),
        )
        .map(|a| Arc::new(a) as Arc<dyn DataPort>),
        _ => YahooAdapter::new(Arc::new(RateGate::per_minute(config.yahoo_per_minute)))
            .map(|a| Arc::new(a) as Arc<dyn DataPort>),
    };
    built.map_err(|e| StratsimError::invalid("data", "providers", format!("{name}: {e}")))
}

#[cfg(not(feature = "http"))]
fn build_http_provider(name: &str, _config: &DataConfig) -> Result<Arc<dyn DataPort>, StratsimError> {
    Err(StratsimError::invalid(
        "data",
        "providers",
        format!("'{name}' needs the http feature"),
    ))
}
