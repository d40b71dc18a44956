//! Transaction cost model.
//!
//! Commission is `commission_per_trade + notional * commission_rate`; slippage is
//! `notional * slippage_rate`. Both are charged as explicit cash costs and the
//! trade itself settles at the market price.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostModel {
    pub commission_rate: f64,
    pub slippage_rate: f64,
    pub commission_per_trade: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TradeCosts {
    pub commission: f64,
    pub slippage: f64,
}

impl TradeCosts {
    pub fn total(&self) -> f64 {
        self.commission + self.slippage
    }
}

impl CostModel {
    pub fn new(commission_rate: f64, slippage_rate: f64) -> Self {
        CostModel {
            commission_rate,
            slippage_rate,
            commission_per_trade: 0.0,
        }
    }

    pub fn with_commission_per_trade(mut self, fee: f64) -> Self {
        self.commission_per_trade = fee;
        self
    }

    /// Proportional cost per unit of notional.
    pub fn cost_rate(&self) -> f64 {
        self.commission_rate + self.slippage_rate
    }

    pub fn costs(&self, notional: f64) -> TradeCosts {
        if notional <= 0.0 {
            return TradeCosts::default();
        }
        TradeCosts {
            commission: self.commission_per_trade + notional * self.commission_rate,
            slippage: notional * self.slippage_rate,
        }
    }

    /// Cash needed to buy `notional` worth, costs included.
    pub fn required_cash(&self, notional: f64) -> f64 {
        notional + self.costs(notional).total()
    }

    /// Largest quantity whose notional plus costs fits in `cash`.
    pub fn max_affordable_quantity(&self, cash: f64, price: f64) -> f64 {
        if price <= 0.0 || !price.is_finite() {
            return 0.0;
        }
        let budget = cash - self.commission_per_trade;
        if budget <= 0.0 {
            return 0.0;
        }
        budget / (price * (1.0 + self.cost_rate()))
    }
}
