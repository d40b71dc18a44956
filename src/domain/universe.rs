//! Universe parsing, price loading and start-up coverage checks.
//!
//! Parses symbol and weight lists from configuration, loads every series the
//! simulation will touch before the loop starts, and fails fast when a
//! universe symbol or the safe asset cannot be priced across the run.

use crate::domain::error::AllotraderError;
use crate::domain::price_store::{PriceSeries, PriceStore, build_unified_timeline};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("malformed weight entry '{0}', expected SYMBOL:WEIGHT")]
    MalformedWeight(String),

    #[error("invalid weight for {symbol}: {value}")]
    InvalidWeight { symbol: String, value: String },
}

/// Parse `"SPY, tlt ,GLD"` into upper-cased, de-duplicated symbols.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = BTreeSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// Parse `"SPY:0.6, TLT:0.4"` into a weight map.
pub fn parse_weights(input: &str) -> Result<BTreeMap<String, f64>, UniverseError> {
    let mut weights = BTreeMap::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let (symbol, value) = trimmed
            .split_once(':')
            .ok_or_else(|| UniverseError::MalformedWeight(trimmed.to_string()))?;
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(UniverseError::MalformedWeight(trimmed.to_string()));
        }
        let weight: f64 = value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|w| (0.0..=1.0).contains(w))
            .ok_or_else(|| UniverseError::InvalidWeight {
                symbol: symbol.clone(),
                value: value.trim().to_string(),
            })?;
        if weights.insert(symbol.clone(), weight).is_some() {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
    }

    Ok(weights)
}

/// Fetch every symbol's bars into a [`PriceStore`]. A symbol whose fetch fails
/// is stored empty; the coverage check decides whether that is fatal.
pub fn load_price_store(
    data_port: &dyn DataPort,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> PriceStore {
    let mut store = PriceStore::new();
    for symbol in symbols {
        let bars = match data_port.fetch_ohlcv(symbol, start_date, end_date) {
            Ok(bars) => bars,
            Err(e) => {
                warn!("no price data loaded for {symbol}: {e}");
                Vec::new()
            }
        };
        info!("  {symbol}: {} bars", bars.len());
        store.insert(PriceSeries::new(symbol.clone(), bars));
    }
    store
}

/// Result of a successful coverage check.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    /// Every date on which at least one universe symbol traded.
    pub calendar: Vec<NaiveDate>,
    /// False only when a safe asset is configured without data and the cash
    /// fallback is enabled.
    pub safe_asset_available: bool,
    /// First and last priced dates of a safe asset that only covers part of
    /// the calendar. Set only when the cash fallback is enabled.
    pub safe_asset_partial: Option<(NaiveDate, NaiveDate)>,
}

/// Verify that every universe symbol is priced across the whole run, and
/// that the safe asset, if configured, covers it too or has an explicit
/// cash fallback.
pub fn validate_price_coverage(
    store: &PriceStore,
    universe: &[String],
    safe_asset: Option<&str>,
    safe_asset_cash_fallback: bool,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<CoverageReport, AllotraderError> {
    let missing: Vec<String> = universe
        .iter()
        .filter(|sym| in_range(store, sym, start_date, end_date).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(AllotraderError::MissingPriceData { symbols: missing });
    }

    let calendar = build_unified_timeline(store, universe, start_date, end_date);
    let (Some(&first), Some(&last)) = (calendar.first(), calendar.last()) else {
        return Err(AllotraderError::EmptyCalendar {
            start: start_date,
            end: end_date,
        });
    };

    for symbol in universe {
        if let Some((sym_first, sym_last)) = in_range(store, symbol, start_date, end_date) {
            if sym_first > first || sym_last < last {
                return Err(AllotraderError::IncompleteCoverage {
                    symbol: symbol.clone(),
                    first: sym_first,
                    last: sym_last,
                    start: first,
                    end: last,
                });
            }
        }
    }

    let mut safe_asset_available = true;
    let mut safe_asset_partial = None;
    if let Some(symbol) = safe_asset {
        match in_range(store, symbol, start_date, end_date) {
            None if !safe_asset_cash_fallback => {
                return Err(AllotraderError::SafeAssetUnavailable {
                    symbol: symbol.to_string(),
                });
            }
            None => {
                warn!("safe asset {symbol} has no price data; defensive weight will be held as cash");
                safe_asset_available = false;
            }
            Some((sym_first, sym_last)) if sym_first > first || sym_last < last => {
                if !safe_asset_cash_fallback {
                    return Err(AllotraderError::IncompleteCoverage {
                        symbol: symbol.to_string(),
                        first: sym_first,
                        last: sym_last,
                        start: first,
                        end: last,
                    });
                }
                warn!(
                    "safe asset {symbol} is priced only from {sym_first} to {sym_last}; \
                     defensive weight outside that range will be held as cash"
                );
                safe_asset_partial = Some((sym_first, sym_last));
            }
            Some(_) => {}
        }
    }

    Ok(CoverageReport {
        calendar,
        safe_asset_available,
        safe_asset_partial,
    })
}

/// First and last tradable dates of `symbol` inside the range.
fn in_range(
    store: &PriceStore,
    symbol: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    let series = store.get(symbol)?;
    let mut dates = series
        .bars
        .iter()
        .filter(|bar| bar.date >= start_date && bar.date <= end_date)
        .filter(|bar| bar.tradable_close().is_some())
        .map(|bar| bar.date);
    let first = dates.next()?;
    let last = dates.last().unwrap_or(first);
    Some((first, last))
}
