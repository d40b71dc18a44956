//! Built-in signal sources and the static strategy registry.
//!
//! Strategies are looked up by name in [`REGISTRY`]; there is no runtime
//! discovery. Each entry builds a boxed [`SignalSource`] from
//! [`StrategyParams`] already parsed out of the configuration.

use crate::domain::error::AllotraderError;
use crate::domain::price_store::PriceView;
use crate::domain::signal::{Signal, SignalReason};
use crate::ports::signal_port::SignalSource;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Dated signal sets, as loaded from a signal file.
pub type SignalSchedule = BTreeMap<NaiveDate, Vec<Signal>>;

/// Inputs a registry entry may draw on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyParams {
    pub universe: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub schedule: Option<SignalSchedule>,
}

pub struct StrategyEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub build: fn(&StrategyParams) -> Result<Box<dyn SignalSource>, AllotraderError>,
}

pub static REGISTRY: &[StrategyEntry] = &[
    StrategyEntry {
        name: "static",
        description: "fixed target weights from [strategy] weights",
        build: StaticAllocation::build,
    },
    StrategyEntry {
        name: "equal_weight",
        description: "equal weight across [strategy] universe",
        build: EqualWeight::build,
    },
    StrategyEntry {
        name: "signal_file",
        description: "dated signal sets read from [strategy] signal_file",
        build: SignalFileSource::build,
    },
];

pub fn find_strategy(name: &str) -> Option<&'static StrategyEntry> {
    REGISTRY.iter().find(|e| e.name.eq_ignore_ascii_case(name.trim()))
}

pub fn build_signal_source(
    name: &str,
    params: &StrategyParams,
) -> Result<Box<dyn SignalSource>, AllotraderError> {
    let entry = find_strategy(name).ok_or_else(|| AllotraderError::UnknownStrategy {
        name: name.to_string(),
        available: REGISTRY.iter().map(|e| e.name).collect::<Vec<_>>().join(", "),
    })?;
    (entry.build)(params)
}

/// Constant target weights on every rebalance date.
#[derive(Debug, Clone)]
pub struct StaticAllocation {
    weights: BTreeMap<String, f64>,
}

impl StaticAllocation {
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        StaticAllocation { weights }
    }

    fn build(params: &StrategyParams) -> Result<Box<dyn SignalSource>, AllotraderError> {
        if params.weights.is_empty() {
            return Err(AllotraderError::config_missing("strategy", "weights"));
        }
        Ok(Box::new(StaticAllocation::new(params.weights.clone())))
    }
}

impl SignalSource for StaticAllocation {
    fn name(&self) -> &str {
        "static"
    }

    fn universe(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }

    fn signals(&mut self, _date: NaiveDate, _prices: &PriceView<'_>) -> Vec<Signal> {
        let blended = self.weights.len() > 1;
        self.weights
            .iter()
            .map(|(symbol, &weight)| {
                let reason = if blended {
                    SignalReason::BlendAllocation
                } else {
                    SignalReason::Rebalancing
                };
                Signal::long(symbol, weight).with_reason(reason)
            })
            .collect()
    }
}

/// `1 / n` across the universe on every rebalance date.
#[derive(Debug, Clone)]
pub struct EqualWeight {
    symbols: Vec<String>,
}

impl EqualWeight {
    pub fn new(symbols: Vec<String>) -> Self {
        EqualWeight { symbols }
    }

    fn build(params: &StrategyParams) -> Result<Box<dyn SignalSource>, AllotraderError> {
        if params.universe.is_empty() {
            return Err(AllotraderError::config_missing("strategy", "universe"));
        }
        Ok(Box::new(EqualWeight::new(params.universe.clone())))
    }
}

impl SignalSource for EqualWeight {
    fn name(&self) -> &str {
        "equal_weight"
    }

    fn universe(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn signals(&mut self, _date: NaiveDate, _prices: &PriceView<'_>) -> Vec<Signal> {
        let weight = 1.0 / self.symbols.len() as f64;
        self.symbols.iter().map(|s| Signal::long(s, weight)).collect()
    }
}

/// Replays a schedule: the latest set dated on or before the rebalance date
/// applies. Before the first entry the target is all cash.
#[derive(Debug, Clone)]
pub struct SignalFileSource {
    schedule: SignalSchedule,
}

impl SignalFileSource {
    pub fn new(schedule: SignalSchedule) -> Self {
        SignalFileSource { schedule }
    }

    fn build(params: &StrategyParams) -> Result<Box<dyn SignalSource>, AllotraderError> {
        match &params.schedule {
            Some(schedule) => Ok(Box::new(SignalFileSource::new(schedule.clone()))),
            None => Err(AllotraderError::config_missing("strategy", "signal_file")),
        }
    }
}

impl SignalSource for SignalFileSource {
    fn name(&self) -> &str {
        "signal_file"
    }

    fn universe(&self) -> Vec<String> {
        let symbols: BTreeSet<&String> = self
            .schedule
            .values()
            .flatten()
            .map(|s| &s.symbol)
            .collect();
        symbols.into_iter().cloned().collect()
    }

    fn signals(&mut self, date: NaiveDate, _prices: &PriceView<'_>) -> Vec<Signal> {
        self.schedule
            .range(..=date)
            .next_back()
            .map(|(_, signals)| signals.clone())
            .unwrap_or_default()
    }
}
