#![allow(dead_code)]

use allotrader::domain::backtest::{
    BacktestConfig, BacktestResult, RebalanceFrequency, Simulation, SimulationContext,
};
use allotrader::domain::error::AllotraderError;
pub use allotrader::domain::ohlcv::OhlcvBar;
use allotrader::domain::price_store::{PriceStore, PriceView};
use allotrader::domain::signal::Signal;
use allotrader::ports::data_port::DataPort;
use allotrader::ports::signal_port::SignalSource;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, AllotraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(AllotraderError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, AllotraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Replays fixed signal sets keyed by date; the latest set on or before the
/// requested date applies. Records every date it was asked about.
pub struct ScriptedSource {
    pub universe: Vec<String>,
    pub script: BTreeMap<NaiveDate, Vec<Signal>>,
    pub calls: Arc<Mutex<Vec<NaiveDate>>>,
}

impl ScriptedSource {
    pub fn new(universe: &[&str]) -> Self {
        Self {
            universe: universe.iter().map(|s| s.to_string()).collect(),
            script: BTreeMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn at(mut self, date: NaiveDate, signals: Vec<Signal>) -> Self {
        self.script.insert(date, signals);
        self
    }

    /// Same weights on every date.
    pub fn constant(universe: &[&str], weights: &[(&str, f64)]) -> Self {
        let signals = weights.iter().map(|(s, w)| Signal::long(s, *w)).collect();
        Self::new(universe).at(NaiveDate::MIN, signals)
    }
}

impl SignalSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn universe(&self) -> Vec<String> {
        self.universe.clone()
    }

    fn signals(&mut self, date: NaiveDate, prices: &PriceView<'_>) -> Vec<Signal> {
        assert_eq!(prices.as_of(), date);
        self.calls.lock().unwrap().push(date);
        self.script
            .range(..=date)
            .next_back()
            .map(|(_, s)| s.clone())
            .unwrap_or_default()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000,
    }
}

/// One bar per calendar day starting at `start_date`, closes taken from `closes`.
pub fn bars_from_closes(symbol: &str, start_date: NaiveDate, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            symbol: symbol.to_string(),
            date: start_date + chrono::Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        })
        .collect()
}

/// Linear price path: `start_price + step * i`.
pub fn generate_bars(
    symbol: &str,
    start_date: NaiveDate,
    count: usize,
    start_price: f64,
    step: f64,
) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + step * i as f64).collect();
    bars_from_closes(symbol, start_date, &closes)
}

pub fn store_with(series: Vec<(&str, Vec<OhlcvBar>)>) -> PriceStore {
    series
        .into_iter()
        .fold(PriceStore::new(), |store, (symbol, bars)| store.with_bars(symbol, bars))
}

/// January 2024, daily rebalancing, no costs.
pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        rebalance_frequency: RebalanceFrequency::Daily,
        ..BacktestConfig::new(date(2024, 1, 1), date(2024, 1, 31), 100_000.0)
    }
}

pub fn run_simulation(
    config: BacktestConfig,
    prices: PriceStore,
    source: impl SignalSource + 'static,
) -> Result<BacktestResult, AllotraderError> {
    let simulation = Simulation::new(SimulationContext {
        config,
        prices,
        source: Box::new(source),
    })?;
    Ok(simulation.run())
}
