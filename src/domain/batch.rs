//! Independent backtests run in parallel.
//!
//! Each job gets its own ledger and data source manager. The provider
//! adapters (and the rate gates inside them) and one bar cache are shared
//! between jobs, so several strategies over one symbol fetch it once.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::info;

use super::backtest::{BacktestReport, StrategyRunner};
use super::bar_cache::BarCache;
use super::config::EngineConfig;
use super::data_source::{DataSourceManager, RetryPolicy, SourceSelection};
use super::error::StratsimError;
use super::strategy::Strategy;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub strategy: String,
    pub source: SourceSelection,
}

pub struct BatchRunner {
    config: EngineConfig,
    providers: Vec<Arc<dyn DataPort>>,
    retry: RetryPolicy,
    cache: Arc<BarCache>,
    parallel: bool,
}

impl BatchRunner {
    pub fn new(
        config: EngineConfig,
        providers: Vec<Arc<dyn DataPort>>,
        retry: RetryPolicy,
    ) -> Self {
        BatchRunner {
            config,
            providers,
            retry,
            cache: Arc::new(BarCache::disabled()),
            parallel: true,
        }
    }

    pub fn with_cache(mut self, ttl: Duration, max_entries: usize) -> Self {
        self.cache = Arc::new(BarCache::new(ttl, max_entries));
        self
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every job. Results come back in job order; one job's failure
    /// does not stop the others.
    pub fn run<F>(&self, jobs: &[BatchJob], make_strategy: F) -> Vec<Result<BacktestReport, StratsimError>>
    where
        F: Fn(&BatchJob) -> Option<Box<dyn Strategy>> + Sync,
    {
        info!(jobs = jobs.len(), parallel = self.parallel, "starting batch");
        if self.parallel {
            jobs.par_iter()
                .map(|job| self.run_one(job, &make_strategy))
                .collect()
        } else {
            jobs.iter()
                .map(|job| self.run_one(job, &make_strategy))
                .collect()
        }
    }

    fn run_one<F>(&self, job: &BatchJob, make_strategy: &F) -> Result<BacktestReport, StratsimError>
    where
        F: Fn(&BatchJob) -> Option<Box<dyn Strategy>>,
    {
        let mut strategy = make_strategy(job).ok_or_else(|| {
            StratsimError::invalid("run", "strategy", format!("unknown strategy '{}'", job.strategy))
        })?;

        let manager = DataSourceManager::with_shared_cache(
            self.providers.clone(),
            self.retry.clone(),
            Arc::clone(&self.cache),
        );
        let runner = StrategyRunner::new(self.config.clone(), manager);
        runner.run_with_source(&job.symbol, job.start, job.end, &job.source, strategy.as_mut())
    }
}
