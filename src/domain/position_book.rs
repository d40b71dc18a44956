//! Open positions keyed by symbol.
//!
//! Ordered by symbol so every iteration, and therefore every trade sequence
//! derived from it, is deterministic.

use crate::domain::position::Position;
use crate::domain::price_store::PriceStore;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionBook {
    positions: BTreeMap<String, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn quantity(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |p| p.quantity)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// Open or increase a position.
    pub fn apply_buy(&mut self, symbol: &str, quantity: f64, price: f64) {
        match self.positions.get_mut(symbol) {
            Some(pos) => pos.add(quantity, price),
            None => {
                self.positions
                    .insert(symbol.to_string(), Position::open(symbol, quantity, price));
            }
        }
    }

    /// Reduce a position, dropping it once closed. Returns `(removed, average_cost)`.
    pub fn apply_sell(&mut self, symbol: &str, quantity: f64, price: f64) -> Option<(f64, f64)> {
        let pos = self.positions.get_mut(symbol)?;
        let average_cost = pos.average_cost;
        let removed = pos.reduce(quantity, price);
        if pos.is_closed() {
            self.positions.remove(symbol);
        }
        Some((removed, average_cost))
    }

    /// Revalue every position at `date`'s close. Returns the symbols that had no
    /// price and kept their previous mark.
    pub fn mark_to_market(&mut self, store: &PriceStore, date: NaiveDate) -> Vec<String> {
        let mut stale = Vec::new();
        for (symbol, pos) in self.positions.iter_mut() {
            match store.close_on(symbol, date) {
                Some(price) => pos.last_mark_price = price,
                None => stale.push(symbol.clone()),
            }
        }
        stale
    }

    pub fn total_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Market value per symbol at the current marks.
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(sym, pos)| (sym.clone(), pos.market_value()))
            .collect()
    }

    /// Current mark prices per symbol.
    pub fn marks(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(sym, pos)| (sym.clone(), pos.last_mark_price))
            .collect()
    }
}
