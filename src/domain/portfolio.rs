//! Portfolio state and per-date snapshots.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::ledger::CashLedger;
use super::position_book::PositionBook;
use super::warning::SimulationWarning;

/// Cash plus positions. The simulation owns exactly one.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub ledger: CashLedger,
    pub book: PositionBook,
    pub initial_cash: f64,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Portfolio {
            ledger: CashLedger::new(initial_cash),
            book: PositionBook::new(),
            initial_cash,
        }
    }

    pub fn cash(&self) -> f64 {
        self.ledger.free_cash()
    }

    /// Cash plus positions at their current marks.
    pub fn total_value(&self) -> f64 {
        self.ledger.free_cash() + self.book.total_value()
    }
}

/// End-of-day view of the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    /// Market value per held symbol.
    pub positions: BTreeMap<String, f64>,
    pub total_value: f64,
    pub rebalanced: bool,
    pub warnings: Vec<SimulationWarning>,
}

impl PortfolioSnapshot {
    pub fn capture(
        date: NaiveDate,
        portfolio: &Portfolio,
        rebalanced: bool,
        warnings: Vec<SimulationWarning>,
    ) -> Self {
        PortfolioSnapshot {
            date,
            cash: portfolio.cash(),
            positions: portfolio.book.values(),
            total_value: portfolio.total_value(),
            rebalanced,
            warnings,
        }
    }

    pub fn invested_value(&self) -> f64 {
        self.positions.values().sum()
    }

    pub fn weight_of(&self, symbol: &str) -> f64 {
        if self.total_value <= 0.0 {
            return 0.0;
        }
        self.positions.get(symbol).copied().unwrap_or(0.0) / self.total_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn new_portfolio_is_all_cash() {
        let portfolio = Portfolio::new(100_000.0);
        assert_relative_eq!(portfolio.cash(), 100_000.0);
        assert_relative_eq!(portfolio.total_value(), 100_000.0);
        assert!(portfolio.book.is_empty());
    }

    #[test]
    fn total_value_includes_marked_positions() {
        let mut portfolio = Portfolio::new(1_000.0);
        portfolio.book.apply_buy("SPY", 10.0, 50.0);
        assert_relative_eq!(portfolio.total_value(), 1_500.0);
    }

    #[test]
    fn snapshot_captures_state() {
        let mut portfolio = Portfolio::new(500.0);
        portfolio.book.apply_buy("SPY", 5.0, 100.0);
        let date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let snap = PortfolioSnapshot::capture(date, &portfolio, true, Vec::new());

        assert_eq!(snap.date, date);
        assert!(snap.rebalanced);
        assert_relative_eq!(snap.cash, 500.0);
        assert_relative_eq!(snap.invested_value(), 500.0);
        assert_relative_eq!(snap.total_value, 1_000.0);
        assert_relative_eq!(snap.weight_of("SPY"), 0.5);
        assert_relative_eq!(snap.weight_of("TLT"), 0.0);
    }
}
