//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::csv_signal_adapter::load_signal_schedule;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{
    BacktestConfig, BacktestResult, RebalanceFrequency, Simulation, SimulationContext,
};
use crate::domain::config_validation::validate_backtest_config;
use crate::domain::error::AllotraderError;
use crate::domain::metrics::{Metrics, SymbolSummary};
use crate::domain::strategy::{REGISTRY, StrategyParams, build_signal_source};
use crate::domain::universe::{load_price_store, parse_symbols, parse_weights};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(
    name = "allotrader",
    about = "Portfolio rebalancing and trade-execution simulator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulation
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for trades.csv, equity.csv and warnings.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Load data and check coverage without simulating
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file without loading price data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the built-in strategies
    Strategies,
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Strategies => {
            run_strategies();
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(&err)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, AllotraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

fn run_backtest(config_path: &Path, output: Option<&Path>) -> Result<(), AllotraderError> {
    let adapter = load_config(config_path)?;
    let simulation = prepare_simulation(&adapter)?;
    let risk_free_rate = simulation.config().risk_free_rate;

    eprintln!(
        "Simulating {} over {} dates...",
        simulation.strategy_name(),
        simulation.calendar().len()
    );
    let result = simulation.run();
    let metrics = Metrics::compute(&result, risk_free_rate);
    print_summary(&result, &metrics);

    if let Some(dir) = output {
        CsvReportAdapter::new(dir.to_path_buf()).write(&result, &metrics)?;
        eprintln!("\nReport written to: {}", dir.display());
    }
    Ok(())
}

fn run_dry_run(config_path: &Path) -> Result<(), AllotraderError> {
    let adapter = load_config(config_path)?;
    let simulation = prepare_simulation(&adapter)?;
    let config = simulation.config();
    let calendar = simulation.calendar();

    eprintln!("Config validated successfully");
    eprintln!("\nStrategy: {}", simulation.strategy_name());
    eprintln!("Rebalance frequency: {}", config.rebalance_frequency);
    if let (Some(first), Some(last)) = (calendar.first(), calendar.last()) {
        eprintln!("Calendar: {} dates, {} to {}", calendar.len(), first, last);
    }
    let rebalances = calendar
        .iter()
        .enumerate()
        .filter(|&(i, &date)| {
            i + 1 < calendar.len()
                && config
                    .rebalance_frequency
                    .is_rebalance_date(i.checked_sub(1).map(|p| calendar[p]), date)
        })
        .count();
    eprintln!("Rebalance events: {rebalances}");
    eprintln!("\nDry run complete: configuration and price coverage are valid");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), AllotraderError> {
    let adapter = load_config(config_path)?;
    let config = build_backtest_config(&adapter)?;
    validate_backtest_config(&config)?;
    let (name, params) = build_strategy_params(&adapter)?;
    let source = build_signal_source(&name, &params)?;

    eprintln!("Config validated successfully");
    eprintln!("  strategy: {}", source.name());
    eprintln!("  universe: {}", source.universe().join(", "));
    if let Some(safe) = &config.safe_asset {
        eprintln!(
            "  safe asset: {safe} (cash fallback {})",
            if config.safe_asset_cash_fallback { "on" } else { "off" }
        );
    }
    Ok(())
}

fn run_strategies() {
    eprintln!("Available strategies:");
    for entry in REGISTRY {
        eprintln!("  {:<14} {}", entry.name, entry.description);
    }
}

/// Build everything a run needs from the config and validate it.
pub fn prepare_simulation(adapter: &FileConfigAdapter) -> Result<Simulation, AllotraderError> {
    let config = build_backtest_config(adapter)?;
    validate_backtest_config(&config)?;

    let (name, params) = build_strategy_params(adapter)?;
    let source = build_signal_source(&name, &params)?;

    let data_dir = adapter
        .get_non_empty("data", "dir")
        .map(|dir| adapter.resolve_path(&dir))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let data_port = CsvAdapter::new(data_dir.clone());

    let symbols = config.required_symbols(&source.universe());
    info!(
        "loading {} symbols from {}",
        symbols.len(),
        data_dir.display()
    );
    let prices = load_price_store(&data_port, &symbols, config.start_date, config.end_date);

    Simulation::new(SimulationContext {
        config,
        prices,
        source,
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, AllotraderError> {
    let start_date = read_date(adapter, "start_date")?;
    let end_date = read_date(adapter, "end_date")?;
    let initial_cash = read_f64(adapter, "backtest", "initial_cash", 100_000.0)?;

    let rebalance_frequency = match adapter.get_non_empty("backtest", "rebalance_frequency") {
        Some(value) => RebalanceFrequency::from_str(&value).map_err(|e| {
            AllotraderError::config_invalid("backtest", "rebalance_frequency", e.to_string())
        })?,
        None => RebalanceFrequency::default(),
    };

    Ok(BacktestConfig {
        commission_rate: read_f64(adapter, "backtest", "commission_rate", 0.0)?,
        slippage_rate: read_f64(adapter, "backtest", "slippage_rate", 0.0)?,
        commission_per_trade: read_f64(adapter, "backtest", "commission_per_trade", 0.0)?,
        rebalance_frequency,
        rebalance_threshold: read_f64(adapter, "backtest", "rebalance_threshold", 0.0)?,
        safe_asset: adapter
            .get_non_empty("backtest", "safe_asset")
            .map(|s| s.to_uppercase()),
        safe_asset_cash_fallback: adapter.get_bool("backtest", "safe_asset_cash_fallback", false),
        cash_symbol: adapter
            .get_non_empty("backtest", "cash_symbol")
            .map(|s| s.to_uppercase())
            .unwrap_or_else(|| "CASH".to_string()),
        risk_free_rate: read_f64(adapter, "backtest", "risk_free_rate", 0.0)?,
        ..BacktestConfig::new(start_date, end_date, initial_cash)
    })
}

/// Strategy name plus the parameters its registry entry may need.
pub fn build_strategy_params(
    adapter: &FileConfigAdapter,
) -> Result<(String, StrategyParams), AllotraderError> {
    let name = adapter
        .get_non_empty("strategy", "name")
        .ok_or_else(|| AllotraderError::config_missing("strategy", "name"))?;

    let universe = match adapter.get_non_empty("strategy", "universe") {
        Some(list) => parse_symbols(&list)
            .map_err(|e| AllotraderError::config_invalid("strategy", "universe", e.to_string()))?,
        None => Vec::new(),
    };
    let weights = match adapter.get_non_empty("strategy", "weights") {
        Some(list) => parse_weights(&list)
            .map_err(|e| AllotraderError::config_invalid("strategy", "weights", e.to_string()))?,
        None => Default::default(),
    };
    let schedule = match adapter.get_non_empty("strategy", "signal_file") {
        Some(file) => Some(load_signal_schedule(&adapter.resolve_path(&file))?),
        None => None,
    };

    Ok((
        name,
        StrategyParams {
            universe,
            weights,
            schedule,
        },
    ))
}

fn read_date(adapter: &dyn ConfigPort, key: &str) -> Result<NaiveDate, AllotraderError> {
    let value = adapter
        .get_non_empty("backtest", key)
        .ok_or_else(|| AllotraderError::config_missing("backtest", key))?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
        AllotraderError::config_invalid(
            "backtest",
            key,
            "invalid date format (expected YYYY-MM-DD)",
        )
    })
}

/// Like [`ConfigPort::get_double`] but a present, non-numeric value is an error.
fn read_f64(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, AllotraderError> {
    match adapter.get_non_empty(section, key) {
        None => Ok(default),
        Some(value) => value.parse::<f64>().map_err(|_| {
            AllotraderError::config_invalid(section, key, format!("'{value}' is not a number"))
        }),
    }
}

fn print_summary(result: &BacktestResult, metrics: &Metrics) {
    eprintln!("\n=== Results: {} ===", result.strategy_name);
    eprintln!("Final Value:      {:.2}", metrics.final_value);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!(
        "Annualized:       {:.2}%",
        metrics.annualized_return * 100.0
    );
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Rebalances:       {}", metrics.rebalance_count);
    eprintln!(
        "Trades:           {} ({} buys, {} sells)",
        metrics.total_trades, metrics.buys, metrics.sells
    );
    eprintln!("Costs:            {:.2}", metrics.total_costs());
    eprintln!("Turnover:         {:.2}x", metrics.turnover);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Warnings:         {}", metrics.warning_count);

    let summaries = SymbolSummary::compute_per_symbol(&result.trades);
    if !summaries.is_empty() {
        eprintln!("\n=== Per-Symbol Summary ===");
        for s in &summaries {
            eprintln!(
                "  {:<8} buys {:>3}  sells {:>3}  realized {:>12.2}  costs {:>10.2}  net cash {:>12.2}",
                s.symbol, s.buys, s.sells, s.realized_pnl, s.costs, s.net_cash_flow
            );
        }
    }
    if result.cancelled {
        eprintln!("\nRun was cancelled before the final date");
    }
}
