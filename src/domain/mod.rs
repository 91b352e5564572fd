//! Core domain types and logic.

pub mod backtest;
pub mod bar_cache;
pub mod batch;
pub mod config;
pub mod data_source;
pub mod error;
pub mod execution;
pub mod indicator;
pub mod metrics;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod sizing;
pub mod strategy;
pub mod volume;
