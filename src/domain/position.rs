//! Positions and the trade log entries that change them.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Quantities at or below this are treated as a closed position.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Long-only holding of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub average_cost: f64,
    pub last_mark_price: f64,
}

impl Position {
    pub fn open(symbol: &str, quantity: f64, price: f64) -> Self {
        Position {
            symbol: symbol.to_string(),
            quantity,
            average_cost: price,
            last_mark_price: price,
        }
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.last_mark_price
    }

    /// Add `quantity` bought at `price`, blending the average cost.
    pub fn add(&mut self, quantity: f64, price: f64) {
        let total = self.quantity + quantity;
        if total > QUANTITY_EPSILON {
            self.average_cost = (self.quantity * self.average_cost + quantity * price) / total;
        }
        self.quantity = total;
        self.last_mark_price = price;
    }

    /// Remove up to `quantity`; returns the quantity actually removed.
    pub fn reduce(&mut self, quantity: f64, price: f64) -> f64 {
        let removed = quantity.min(self.quantity);
        self.quantity -= removed;
        if self.quantity <= QUANTITY_EPSILON {
            self.quantity = 0.0;
        }
        self.last_mark_price = price;
        removed
    }

    pub fn is_closed(&self) -> bool {
        self.quantity <= QUANTITY_EPSILON
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Sell,
    Buy,
}

impl TradeAction {
    /// Execution priority within a rebalance event: sells settle first.
    pub fn priority(self) -> u8 {
        match self {
            TradeAction::Sell => 0,
            TradeAction::Buy => 1,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Sell => write!(f, "sell"),
            TradeAction::Buy => write!(f, "buy"),
        }
    }
}

/// Immutable trade log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
    pub slippage: f64,
    /// Price PnL against average cost net of this trade's costs. Zero for buys.
    pub realized_pnl: f64,
}

impl Trade {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }

    pub fn costs(&self) -> f64 {
        self.commission + self.slippage
    }

    /// Signed cash movement caused by this trade.
    pub fn cash_flow(&self) -> f64 {
        match self.action {
            TradeAction::Sell => self.notional() - self.costs(),
            TradeAction::Buy => -(self.notional() + self.costs()),
        }
    }
}
