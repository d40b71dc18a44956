//! In-memory price series store and the shared trading calendar.
//!
//! All price data is loaded before the simulation starts; nothing in here
//! performs I/O.

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub symbol: String,
    pub bars: Vec<OhlcvBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl PriceSeries {
    /// Bars are sorted by date; for duplicate dates the last bar wins.
    pub fn new(symbol: String, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<OhlcvBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        let date_index = deduped
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            symbol,
            bars: deduped,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.get_bar(date).and_then(OhlcvBar::tradable_close)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Bars dated on or before `as_of`.
    pub fn history_until(&self, as_of: NaiveDate) -> &[OhlcvBar] {
        let end = self.bars.partition_point(|b| b.date <= as_of);
        &self.bars[..end]
    }
}

/// Read-only price store keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct PriceStore {
    series: BTreeMap<String, PriceSeries>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol.clone(), series);
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.insert(PriceSeries::new(symbol.to_string(), bars));
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceSeries> {
        self.series.get(symbol)
    }

    /// True when the symbol has at least one bar.
    pub fn has_data(&self, symbol: &str) -> bool {
        self.series.get(symbol).is_some_and(|s| !s.is_empty())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Tradable close for `symbol` on `date`, if any.
    pub fn close_on(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(symbol).and_then(|s| s.close_on(date))
    }

    /// Tradable closes of `symbols` on `date`. Symbols without a price are absent.
    pub fn price_map<'a, I>(&self, symbols: I, date: NaiveDate) -> BTreeMap<String, f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        symbols
            .into_iter()
            .filter_map(|sym| self.close_on(sym, date).map(|p| (sym.to_string(), p)))
            .collect()
    }

    pub fn view(&self, as_of: NaiveDate) -> PriceView<'_> {
        PriceView { store: self, as_of }
    }
}

/// A look-ahead-free window onto the store, handed to signal sources.
#[derive(Debug, Clone, Copy)]
pub struct PriceView<'a> {
    store: &'a PriceStore,
    as_of: NaiveDate,
}

impl<'a> PriceView<'a> {
    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn close(&self, symbol: &str) -> Option<f64> {
        self.store.close_on(symbol, self.as_of)
    }

    pub fn history(&self, symbol: &str) -> &'a [OhlcvBar] {
        self.store
            .get(symbol)
            .map(|s| s.history_until(self.as_of))
            .unwrap_or(&[])
    }
}

/// Union of all dates on which any of `symbols` traded, within `[start, end]`.
pub fn build_unified_timeline(
    store: &PriceStore,
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = symbols
        .iter()
        .filter_map(|sym| store.get(sym))
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .filter(|d| *d >= start && *d <= end)
        .collect();
    unique_dates.into_iter().collect()
}
