//! Simulation configuration and the daily event loop.
//!
//! `INIT -> (per date) MARK -> [rebalance date] REBALANCE -> EXECUTE -> SNAPSHOT`,
//! with every open position liquidated at the final mark on the last date.

use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use super::config_validation::validate_backtest_config;
use super::cost::CostModel;
use super::error::AllotraderError;
use super::execution::{ExecutionEngine, ExecutionReport};
use super::portfolio::{Portfolio, PortfolioSnapshot};
use super::position::Trade;
use super::price_store::PriceStore;
use super::rebalancer::{Rebalancer, RebalancerConfig, TradeIntent};
use super::universe::validate_price_coverage;
use super::warning::{self, SimulationWarning, WarningKind};
use crate::ports::signal_port::SignalSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Annually,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown rebalance frequency '{0}' (expected daily, weekly, monthly, quarterly or annually)")]
pub struct ParseFrequencyError(pub String);

impl FromStr for RebalanceFrequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            "quarterly" => Ok(RebalanceFrequency::Quarterly),
            "annually" | "yearly" => Ok(RebalanceFrequency::Annually),
            _ => Err(ParseFrequencyError(s.to_string())),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebalanceFrequency::Daily => "daily",
            RebalanceFrequency::Weekly => "weekly",
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
            RebalanceFrequency::Annually => "annually",
        };
        f.write_str(s)
    }
}

impl RebalanceFrequency {
    /// True on the first calendar date and whenever `date` opens a new period
    /// relative to the previous calendar date.
    pub fn is_rebalance_date(self, previous: Option<NaiveDate>, date: NaiveDate) -> bool {
        let Some(prev) = previous else {
            return true;
        };
        match self {
            RebalanceFrequency::Daily => true,
            RebalanceFrequency::Weekly => prev.iso_week() != date.iso_week(),
            RebalanceFrequency::Monthly => {
                (prev.year(), prev.month()) != (date.year(), date.month())
            }
            RebalanceFrequency::Quarterly => {
                (prev.year(), prev.month0() / 3) != (date.year(), date.month0() / 3)
            }
            RebalanceFrequency::Annually => prev.year() != date.year(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_cash: f64,
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub commission_per_trade: f64,
    pub rebalance_frequency: RebalanceFrequency,
    pub rebalance_threshold: f64,
    pub safe_asset: Option<String>,
    pub safe_asset_cash_fallback: bool,
    pub cash_symbol: String,
    pub risk_free_rate: f64,
}

impl BacktestConfig {
    /// Cost-free, monthly, no safe asset.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, initial_cash: f64) -> Self {
        BacktestConfig {
            start_date,
            end_date,
            initial_cash,
            commission_rate: 0.0,
            slippage_rate: 0.0,
            commission_per_trade: 0.0,
            rebalance_frequency: RebalanceFrequency::default(),
            rebalance_threshold: 0.0,
            safe_asset: None,
            safe_asset_cash_fallback: false,
            cash_symbol: "CASH".to_string(),
            risk_free_rate: 0.0,
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.commission_rate, self.slippage_rate)
            .with_commission_per_trade(self.commission_per_trade)
    }

    pub fn rebalancer_config(&self) -> RebalancerConfig {
        RebalancerConfig {
            safe_asset: self.safe_asset.clone(),
            safe_asset_cash_fallback: self.safe_asset_cash_fallback,
            cash_symbol: self.cash_symbol.clone(),
            rebalance_threshold: self.rebalance_threshold,
        }
    }

    /// Every symbol whose prices must be loaded before the run.
    pub fn required_symbols(&self, universe: &[String]) -> Vec<String> {
        let mut symbols: BTreeSet<String> = universe
            .iter()
            .filter(|s| !s.eq_ignore_ascii_case(&self.cash_symbol))
            .cloned()
            .collect();
        if let Some(safe) = &self.safe_asset {
            symbols.insert(safe.clone());
        }
        symbols.into_iter().collect()
    }
}

/// Everything one simulation needs, passed in explicitly.
pub struct SimulationContext {
    pub config: BacktestConfig,
    pub prices: PriceStore,
    pub source: Box<dyn SignalSource>,
}

/// Output of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub initial_cash: f64,
    pub trades: Vec<Trade>,
    /// One per simulated date.
    pub snapshots: Vec<PortfolioSnapshot>,
    pub cancelled: bool,
}

impl BacktestResult {
    pub fn final_value(&self) -> f64 {
        self.snapshots
            .last()
            .map_or(self.initial_cash, |s| s.total_value)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &SimulationWarning> {
        self.snapshots.iter().flat_map(|s| s.warnings.iter())
    }

    pub fn warning_count(&self) -> usize {
        self.snapshots.iter().map(|s| s.warnings.len()).sum()
    }
}

/// A validated, ready-to-run simulation.
pub struct Simulation {
    config: BacktestConfig,
    prices: PriceStore,
    source: Box<dyn SignalSource>,
    calendar: Vec<NaiveDate>,
    rebalancer: Rebalancer,
    engine: ExecutionEngine,
    startup_warnings: Vec<SimulationWarning>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("strategy", &self.source.name())
            .field("dates", &self.calendar.len())
            .finish()
    }
}

impl Simulation {
    /// Validate configuration and price coverage. Fails before any trade.
    pub fn new(ctx: SimulationContext) -> Result<Self, AllotraderError> {
        let SimulationContext {
            config,
            prices,
            source,
        } = ctx;
        validate_backtest_config(&config)?;

        let universe: Vec<String> = source
            .universe()
            .into_iter()
            .filter(|s| !s.eq_ignore_ascii_case(&config.cash_symbol))
            .filter(|s| config.safe_asset.as_deref() != Some(s.as_str()))
            .collect();

        let coverage = validate_price_coverage(
            &prices,
            &universe,
            config.safe_asset.as_deref(),
            config.safe_asset_cash_fallback,
            config.start_date,
            config.end_date,
        )?;

        let mut rebalancer = Rebalancer::new(config.rebalancer_config());
        let mut startup_warnings = Vec::new();
        if !coverage.safe_asset_available {
            rebalancer = rebalancer.with_safe_asset_unavailable();
            if let (Some(symbol), Some(&first)) = (&config.safe_asset, coverage.calendar.first()) {
                startup_warnings.push(SimulationWarning::new(
                    first,
                    WarningKind::SafeAssetFallback,
                    Some(symbol.as_str()),
                    "no price data; defensive weight is held as cash for the whole run".to_string(),
                ));
            }
        }
        if let (Some((priced_from, priced_to)), Some(symbol), Some(&first)) = (
            coverage.safe_asset_partial,
            &config.safe_asset,
            coverage.calendar.first(),
        ) {
            startup_warnings.push(SimulationWarning::new(
                first,
                WarningKind::SafeAssetFallback,
                Some(symbol.as_str()),
                format!(
                    "priced only from {priced_from} to {priced_to}; defensive weight outside that range is held as cash"
                ),
            ));
        }

        info!(
            "simulation ready: strategy {}, {} symbols, {} dates, {} rebalancing",
            source.name(),
            universe.len(),
            coverage.calendar.len(),
            config.rebalance_frequency
        );

        Ok(Simulation {
            engine: ExecutionEngine::new(config.cost_model()),
            config,
            prices,
            source,
            calendar: coverage.calendar,
            rebalancer,
            startup_warnings,
        })
    }

    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &str {
        self.source.name()
    }

    pub fn run(self) -> BacktestResult {
        self.run_with_cancel(&AtomicBool::new(false))
    }

    /// Run until the calendar ends or `cancel` is set. A cancelled run keeps
    /// the snapshots taken so far and skips the final liquidation.
    ///
    /// The final calendar date never rebalances, even when it is a scheduled
    /// rebalance date. Open positions are liquidated at that date's marks
    /// instead.
    pub fn run_with_cancel(mut self, cancel: &AtomicBool) -> BacktestResult {
        let mut portfolio = Portfolio::new(self.config.initial_cash);
        let mut trades = Vec::new();
        let mut snapshots = Vec::with_capacity(self.calendar.len());
        let mut pending = std::mem::take(&mut self.startup_warnings);
        let mut cancelled = false;
        let mut previous: Option<NaiveDate> = None;

        let calendar = std::mem::take(&mut self.calendar);
        let last_index = calendar.len().saturating_sub(1);

        for (i, &date) in calendar.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                info!("cancelled before {date}; {} snapshots kept", snapshots.len());
                cancelled = true;
                break;
            }

            let mut warnings = std::mem::take(&mut pending);
            self.mark(date, &mut portfolio, &mut warnings);

            let is_last = i == last_index;
            let rebalanced =
                !is_last && self.config.rebalance_frequency.is_rebalance_date(previous, date);
            if rebalanced {
                let report = self.rebalance(date, &mut portfolio);
                warnings.extend(report.warnings);
                trades.extend(report.trades);
            }
            if is_last {
                let report = self.liquidate(date, &mut portfolio);
                warnings.extend(report.warnings);
                trades.extend(report.trades);
            }

            snapshots.push(PortfolioSnapshot::capture(date, &portfolio, rebalanced, warnings));
            previous = Some(date);
        }

        let result = BacktestResult {
            strategy_name: self.source.name().to_string(),
            initial_cash: self.config.initial_cash,
            trades,
            snapshots,
            cancelled,
        };
        info!(
            "simulation finished: {} trades, {} snapshots, final value {:.2}",
            result.trades.len(),
            result.snapshots.len(),
            result.final_value()
        );
        result
    }

    fn mark(&self, date: NaiveDate, portfolio: &mut Portfolio, warnings: &mut Vec<SimulationWarning>) {
        for symbol in portfolio.book.mark_to_market(&self.prices, date) {
            warning::record(
                warnings,
                SimulationWarning::new(
                    date,
                    WarningKind::StaleMark,
                    Some(symbol.as_str()),
                    "no close; valued at previous mark".to_string(),
                ),
            );
        }
    }

    /// One atomic rebalance event: signals, plan, execution.
    fn rebalance(&mut self, date: NaiveDate, portfolio: &mut Portfolio) -> ExecutionReport {
        let view = self.prices.view(date);
        let signals = self.source.signals(date, &view);

        let mut symbols: BTreeSet<&str> = portfolio.book.symbols().collect();
        symbols.extend(signals.iter().map(|s| s.symbol.as_str()));
        if let Some(safe) = &self.config.safe_asset {
            symbols.insert(safe.as_str());
        }
        let prices = self.prices.price_map(symbols, date);

        let portfolio_value = portfolio.total_value();
        let plan = self
            .rebalancer
            .rebalance(date, &portfolio.book, &signals, portfolio_value, &prices);
        let mut report = self
            .engine
            .execute(date, &plan.intents, &prices, portfolio);

        debug!(
            "{date}: value {portfolio_value:.2} -> {:.2}, costs {:.2}",
            portfolio.total_value(),
            report.total_costs
        );

        let mut warnings = plan.warnings;
        warnings.append(&mut report.warnings);
        report.warnings = warnings;
        report
    }

    /// Close every position at its final mark.
    fn liquidate(&self, date: NaiveDate, portfolio: &mut Portfolio) -> ExecutionReport {
        let intents: Vec<TradeIntent> = portfolio
            .book
            .positions()
            .map(|p| TradeIntent::sell_all(&p.symbol, p.quantity))
            .collect();
        if intents.is_empty() {
            return ExecutionReport::default();
        }
        let marks = portfolio.book.marks();
        info!("{date}: liquidating {} positions", intents.len());
        self.engine.execute(date, &intents, &marks, portfolio)
    }
}
