//! CLI definition and dispatch.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::adapters::build_providers;
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::BacktestReport;
use crate::domain::batch::{BatchJob, BatchRunner};
use crate::domain::config::{DataConfig, EngineConfig, RunConfig, StrategyConfig};
use crate::domain::data_source::SourceSelection;
use crate::domain::error::StratsimError;
use crate::domain::strategy::BUILTIN_NAMES;

#[derive(Parser, Debug)]
#[command(name = "stratsim", about = "Strategy backtesting and execution simulation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest for every configured symbol
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides `[run] symbols`; repeat for several
        #[arg(long)]
        symbol: Vec<String>,
        /// Overrides `[run] strategy`
        #[arg(short, long)]
        strategy: Option<String>,
        /// Overrides `[run] source` (`auto` or a provider name)
        #[arg(long)]
        source: Option<String>,
        /// Print reports as JSON instead of a summary
        #[arg(long)]
        json: bool,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a configuration file without fetching data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the configured CSV directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            symbol,
            strategy,
            source,
            json,
            output,
        } => run_backtest(
            &config,
            &Overrides {
                symbols: symbol,
                strategy,
                source,
            },
            json,
            output.as_deref(),
        ),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Command-line values that take precedence over the `[run]` section.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub symbols: Vec<String>,
    pub strategy: Option<String>,
    pub source: Option<String>,
}

/// Everything a backtest invocation needs, parsed and validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineConfig,
    pub data: DataConfig,
    pub run: RunConfig,
    pub strategy: StrategyConfig,
}

pub fn load_settings(adapter: &FileConfigAdapter, overrides: &Overrides) -> Result<Settings, StratsimError> {
    let engine = EngineConfig::from_config(adapter)?;
    let data = DataConfig::from_config(adapter)?;
    let mut run = RunConfig::from_config(adapter)?;
    let strategy = StrategyConfig::from_config(adapter)?;

    if !overrides.symbols.is_empty() {
        run.symbols = overrides.symbols.iter().map(|s| s.trim().to_uppercase()).collect();
    }
    if let Some(name) = &overrides.strategy {
        run.strategy = name.trim().to_string();
    }
    if let Some(source) = &overrides.source {
        run.source = source.trim().to_string();
    }

    if strategy.build(&run.strategy).is_none() {
        return Err(StratsimError::invalid(
            "run",
            "strategy",
            format!(
                "unknown strategy '{}' (expected one of {})",
                run.strategy,
                BUILTIN_NAMES.join(", ")
            ),
        ));
    }

    Ok(Settings {
        engine,
        data,
        run,
        strategy,
    })
}

/// Configured symbols, or every file in the CSV directory when none are set.
pub fn resolve_symbols(settings: &Settings) -> Result<Vec<String>, StratsimError> {
    if !settings.run.symbols.is_empty() {
        return Ok(settings.run.symbols.clone());
    }
    let Some(dir) = &settings.data.csv_dir else {
        return Err(StratsimError::missing("run", "symbols"));
    };
    let symbols = CsvAdapter::new(dir.clone())
        .list_symbols()
        .map_err(|e| StratsimError::invalid("data", "csv_dir", e.to_string()))?;
    if symbols.is_empty() {
        return Err(StratsimError::missing("run", "symbols"));
    }
    Ok(symbols)
}

pub fn build_jobs(settings: &Settings, symbols: &[String]) -> Vec<BatchJob> {
    let source = SourceSelection::parse(&settings.run.source);
    symbols
        .iter()
        .map(|symbol| BatchJob {
            symbol: symbol.clone(),
            start: settings.run.start_date,
            end: settings.run.end_date,
            strategy: settings.run.strategy.clone(),
            source: source.clone(),
        })
        .collect()
}

/// Run every job; the first hard error aborts the invocation.
pub fn execute(settings: &Settings, jobs: &[BatchJob]) -> Result<Vec<BacktestReport>, StratsimError> {
    let providers = build_providers(&settings.data)?;
    let runner = BatchRunner::new(settings.engine.clone(), providers, settings.data.retry.clone())
        .with_cache(settings.data.cache_ttl, settings.data.cache_max_entries)
        .with_parallelism(settings.run.parallel);
    runner
        .run(jobs, |job| settings.strategy.build(&job.strategy))
        .into_iter()
        .collect()
}

fn run_backtest(
    config_path: &Path,
    overrides: &Overrides,
    json: bool,
    output: Option<&Path>,
) -> Result<ExitCode, StratsimError> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let settings = load_settings(&adapter, overrides)?;
    let symbols = resolve_symbols(&settings)?;

    eprintln!(
        "Running {} on {} symbol(s), {} to {}",
        settings.run.strategy,
        symbols.len(),
        settings.run.start_date,
        settings.run.end_date
    );
    let jobs = build_jobs(&settings, &symbols);
    let reports = execute(&settings, &jobs)?;

    let rendered = if json {
        render_json(&reports)?
    } else {
        render_text(&reports)
    };
    match output {
        Some(path) => {
            fs::write(path, rendered)?;
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    let failed = reports.iter().filter(|r| r.incomplete).count();
    if failed == reports.len() {
        let symbol = symbols.join(",");
        let err = StratsimError::NoData { symbol };
        eprintln!("error: {err}");
        return Ok((&err).into());
    }
    if failed > 0 {
        eprintln!("warning: {failed} of {} run(s) incomplete", reports.len());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn render_json(reports: &[BacktestReport]) -> Result<String, StratsimError> {
    let mut out = serde_json::to_string_pretty(reports).map_err(std::io::Error::other)?;
    out.push('\n');
    Ok(out)
}

pub fn render_text(reports: &[BacktestReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(out, "=== {} ({}) ===", report.symbol, report.strategy);
        let _ = writeln!(out, "State:            {}", report.state);
        if let Some(source) = &report.data_source {
            let _ = writeln!(out, "Data Source:      {source}");
        }
        for failure in &report.source_failures {
            let _ = writeln!(
                out,
                "  {} failed after {} attempt(s): {}",
                failure.provider, failure.attempts, failure.error
            );
        }
        match &report.performance {
            Some(p) => {
                let _ = writeln!(out, "Total Return:     {:.2}%", p.total_return * 100.0);
                let _ = writeln!(out, "Annualized:       {:.2}%", p.annualized_return * 100.0);
                let _ = writeln!(out, "Volatility:       {:.2}%", p.volatility * 100.0);
                let _ = writeln!(out, "Sharpe Ratio:     {:.2}", p.sharpe_ratio);
                let _ = writeln!(out, "Sortino Ratio:    {:.2}", p.sortino_ratio);
                let _ = writeln!(
                    out,
                    "Max Drawdown:     -{:.1}% ({} bars)",
                    p.max_drawdown * 100.0,
                    p.max_drawdown_duration
                );
                let _ = writeln!(out, "Total Trades:     {}", p.total_trades);
                let _ = writeln!(out, "Win Rate:         {:.1}%", p.win_rate * 100.0);
                let _ = writeln!(out, "Final Value:      {:.2}", p.final_value);
                let _ = writeln!(out, "Commission Paid:  {:.2}", p.total_commission);
                let _ = writeln!(out, "Slippage Cost:    {:.2}", p.total_slippage);
            }
            None => {
                let _ = writeln!(out, "Incomplete:       no performance figures");
            }
        }
        if !report.rejected_signals.is_empty() {
            let _ = writeln!(out, "Rejected Signals: {}", report.rejected_signals.len());
        }
        out.push('\n');
    }
    out
}

fn run_validate(config_path: &Path) -> Result<ExitCode, StratsimError> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let settings = load_settings(&adapter, &Overrides::default())?;
    let providers = build_providers(&settings.data)?;
    let symbols = resolve_symbols(&settings)?;

    println!("Configuration OK: {}", config_path.display());
    println!(
        "  capital {:.2}, commission {:.2}, slippage {}%",
        settings.engine.initial_capital,
        settings.engine.commission_per_trade,
        settings.engine.slippage_percent
    );
    let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    println!("  providers: {}", names.join(" -> "));
    println!("  strategy: {}", settings.run.strategy);
    println!("  symbols: {}", symbols.join(", "));
    println!(
        "  period: {} to {}",
        settings.run.start_date, settings.run.end_date
    );
    Ok(ExitCode::SUCCESS)
}

fn run_list_symbols(config_path: &Path) -> Result<ExitCode, StratsimError> {
    let adapter = FileConfigAdapter::from_file(config_path)?;
    let data = DataConfig::from_config(&adapter)?;
    let dir = data
        .csv_dir
        .ok_or_else(|| StratsimError::missing("data", "csv_dir"))?;
    let symbols = CsvAdapter::new(dir)
        .list_symbols()
        .map_err(|e| StratsimError::invalid("data", "csv_dir", e.to_string()))?;
    for symbol in symbols {
        println!("{symbol}");
    }
    Ok(ExitCode::SUCCESS)
}
