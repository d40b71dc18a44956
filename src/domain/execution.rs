//! Trade execution and fill simulation.
//!
//! Applies ordered trade intents against the portfolio: sells settle before any
//! buy, costs come from the [`CostModel`], and buys that exceed free cash are
//! scaled down to the affordable quantity instead of failing the rebalance.

use chrono::NaiveDate;
use log::debug;
use std::collections::BTreeMap;

use super::cost::CostModel;
use super::ledger::CASH_EPSILON;
use super::portfolio::Portfolio;
use super::position::{QUANTITY_EPSILON, Trade, TradeAction};
use super::rebalancer::TradeIntent;
use super::warning::{self, SimulationWarning, WarningKind};

/// Outcome of one execution run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub trades: Vec<Trade>,
    pub warnings: Vec<SimulationWarning>,
    pub total_costs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEngine {
    cost_model: CostModel,
}

impl ExecutionEngine {
    pub fn new(cost_model: CostModel) -> Self {
        ExecutionEngine { cost_model }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    /// Execute `intents` at `prices`. Every sell runs before every buy
    /// regardless of the order intents arrive in.
    pub fn execute(
        &self,
        date: NaiveDate,
        intents: &[TradeIntent],
        prices: &BTreeMap<String, f64>,
        portfolio: &mut Portfolio,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for phase in [TradeAction::Sell, TradeAction::Buy] {
            for intent in intents.iter().filter(|i| i.action == phase) {
                let Some(price) = tradable_price(prices, &intent.symbol) else {
                    warning::record(
                        &mut report.warnings,
                        SimulationWarning::new(
                            date,
                            WarningKind::SkippedTrade,
                            Some(intent.symbol.as_str()),
                            format!("{} skipped: no tradable price", intent.action),
                        ),
                    );
                    continue;
                };
                let trade = match phase {
                    TradeAction::Sell => self.sell(date, intent, price, portfolio, &mut report),
                    TradeAction::Buy => self.buy(date, intent, price, portfolio, &mut report),
                };
                if let Some(trade) = trade {
                    report.total_costs += trade.costs();
                    report.trades.push(trade);
                }
            }
        }

        debug!(
            "{date}: executed {} of {} intents, costs {:.2}, cash {:.2}",
            report.trades.len(),
            intents.len(),
            report.total_costs,
            portfolio.ledger.free_cash()
        );
        report
    }

    fn sell(
        &self,
        date: NaiveDate,
        intent: &TradeIntent,
        price: f64,
        portfolio: &mut Portfolio,
        report: &mut ExecutionReport,
    ) -> Option<Trade> {
        let held = portfolio.book.quantity(&intent.symbol);
        let quantity = if intent.target_quantity <= QUANTITY_EPSILON {
            held
        } else {
            intent.quantity_delta().min(held)
        };
        if quantity <= QUANTITY_EPSILON {
            warning::record(
                &mut report.warnings,
                SimulationWarning::new(
                    date,
                    WarningKind::SkippedTrade,
                    Some(intent.symbol.as_str()),
                    "sell skipped: no position held".to_string(),
                ),
            );
            return None;
        }

        let notional = quantity * price;
        let costs = self.cost_model.costs(notional);
        if let Err(e) = portfolio.ledger.settle(notional - costs.total()) {
            warning::record(
                &mut report.warnings,
                SimulationWarning::new(
                    date,
                    WarningKind::SkippedTrade,
                    Some(intent.symbol.as_str()),
                    format!("sell skipped: {e}"),
                ),
            );
            return None;
        }

        let (removed, average_cost) = portfolio.book.apply_sell(&intent.symbol, quantity, price)?;

        Some(Trade {
            date,
            symbol: intent.symbol.clone(),
            action: TradeAction::Sell,
            quantity: removed,
            price,
            commission: costs.commission,
            slippage: costs.slippage,
            realized_pnl: removed * (price - average_cost) - costs.total(),
        })
    }

    fn buy(
        &self,
        date: NaiveDate,
        intent: &TradeIntent,
        price: f64,
        portfolio: &mut Portfolio,
        report: &mut ExecutionReport,
    ) -> Option<Trade> {
        let requested = intent.target_quantity - portfolio.book.quantity(&intent.symbol);
        if requested <= QUANTITY_EPSILON {
            return None;
        }

        let free_cash = portfolio.ledger.free_cash();
        let mut quantity = requested;
        let required = self.cost_model.required_cash(requested * price);
        if required > free_cash + CASH_EPSILON {
            quantity = self.cost_model.max_affordable_quantity(free_cash, price);
            if quantity <= QUANTITY_EPSILON {
                warning::record(
                    &mut report.warnings,
                    SimulationWarning::new(
                        date,
                        WarningKind::SkippedTrade,
                        Some(intent.symbol.as_str()),
                        format!("buy skipped: needs {required:.2}, free cash {free_cash:.2}"),
                    ),
                );
                return None;
            }
            warning::record(
                &mut report.warnings,
                SimulationWarning::new(
                    date,
                    WarningKind::PartialFill,
                    Some(intent.symbol.as_str()),
                    format!(
                        "filled {quantity:.6} of {requested:.6}; shortfall {:.2}",
                        required - free_cash
                    ),
                ),
            );
        }

        let notional = quantity * price;
        let costs = self.cost_model.costs(notional);
        if let Err(e) = portfolio.ledger.debit(notional + costs.total()) {
            warning::record(
                &mut report.warnings,
                SimulationWarning::new(
                    date,
                    WarningKind::SkippedTrade,
                    Some(intent.symbol.as_str()),
                    format!("buy skipped: {e}"),
                ),
            );
            return None;
        }
        portfolio.book.apply_buy(&intent.symbol, quantity, price);

        Some(Trade {
            date,
            symbol: intent.symbol.clone(),
            action: TradeAction::Buy,
            quantity,
            price,
            commission: costs.commission,
            slippage: costs.slippage,
            realized_pnl: 0.0,
        })
    }
}

fn tradable_price(prices: &BTreeMap<String, f64>, symbol: &str) -> Option<f64> {
    prices
        .get(symbol)
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
}
