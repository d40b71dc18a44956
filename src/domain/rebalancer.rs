//! Turns a signal set into an ordered list of trade intents.
//!
//! Steps, in order:
//! 1. Aggregate signals per symbol. Signals naming the cash symbol carry
//!    explicit cash weight. Held symbols with no signal are closed.
//! 2. Normalize. Over-allocated sets (sum > 1) are rescaled to exactly 1;
//!    smaller sums leave the residual in cash. An all-zero set targets the safe
//!    asset when one is configured, cash otherwise.
//! 3. Redirect safe-asset weight to cash when the safe asset is unavailable and
//!    the cash fallback is enabled.
//! 4. Zero the weight of desired symbols without a price (risk-share scaling);
//!    the residual stays in cash and is never redistributed.
//! 5. Compare target and current quantities; emit sells then buys.

use crate::domain::position::{QUANTITY_EPSILON, TradeAction};
use crate::domain::position_book::PositionBook;
use crate::domain::signal::Signal;
use crate::domain::warning::{self, SimulationWarning, WarningKind};
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// Weight sums within this distance of 1.0 are not rescaled.
const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct RebalancerConfig {
    pub safe_asset: Option<String>,
    pub safe_asset_cash_fallback: bool,
    pub cash_symbol: String,
    /// Quantity changes worth at most this fraction of portfolio value are skipped.
    pub rebalance_threshold: f64,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        RebalancerConfig {
            safe_asset: None,
            safe_asset_cash_fallback: false,
            cash_symbol: "CASH".to_string(),
            rebalance_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub symbol: String,
    pub action: TradeAction,
    pub target_quantity: f64,
    pub current_quantity: f64,
}

impl TradeIntent {
    pub fn sell_all(symbol: &str, current_quantity: f64) -> Self {
        TradeIntent {
            symbol: symbol.to_string(),
            action: TradeAction::Sell,
            target_quantity: 0.0,
            current_quantity,
        }
    }

    pub fn priority(&self) -> u8 {
        self.action.priority()
    }

    /// Absolute quantity to trade.
    pub fn quantity_delta(&self) -> f64 {
        (self.target_quantity - self.current_quantity).abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalancePlan {
    pub date: NaiveDate,
    /// Sells first, then buys; each group ordered by symbol.
    pub intents: Vec<TradeIntent>,
    /// Final weight per tradable symbol.
    pub target_weights: BTreeMap<String, f64>,
    pub cash_weight: f64,
    pub risk_share: f64,
    pub warnings: Vec<SimulationWarning>,
}

impl RebalancePlan {
    pub fn sells(&self) -> impl Iterator<Item = &TradeIntent> {
        self.intents.iter().filter(|i| i.action == TradeAction::Sell)
    }

    pub fn buys(&self) -> impl Iterator<Item = &TradeIntent> {
        self.intents.iter().filter(|i| i.action == TradeAction::Buy)
    }
}

#[derive(Debug, Clone)]
pub struct Rebalancer {
    config: RebalancerConfig,
    safe_asset_available: bool,
}

impl Rebalancer {
    pub fn new(config: RebalancerConfig) -> Self {
        Rebalancer {
            config,
            safe_asset_available: true,
        }
    }

    /// Mark the safe asset as having no usable data for the whole run.
    pub fn with_safe_asset_unavailable(mut self) -> Self {
        self.safe_asset_available = false;
        self
    }

    pub fn config(&self) -> &RebalancerConfig {
        &self.config
    }

    pub fn rebalance(
        &self,
        date: NaiveDate,
        book: &PositionBook,
        signals: &[Signal],
        portfolio_value: f64,
        prices: &BTreeMap<String, f64>,
    ) -> RebalancePlan {
        let mut warnings = Vec::new();

        let (mut weights, mut cash_weight) = self.aggregate(date, signals, &mut warnings);
        self.normalize(&mut weights, &mut cash_weight);
        self.redirect_safe_asset(date, &mut weights, &mut cash_weight, prices, &mut warnings);
        let risk_share = apply_risk_share(date, &mut weights, &mut cash_weight, prices, &mut warnings);

        let intents = self.build_intents(date, book, &weights, portfolio_value, prices, &mut warnings);

        debug!(
            "{date}: {} intents, invested weight {:.4}, cash weight {:.4}, risk share {:.2}",
            intents.len(),
            weights.values().sum::<f64>(),
            cash_weight,
            risk_share
        );

        RebalancePlan {
            date,
            intents,
            target_weights: weights,
            cash_weight,
            risk_share,
            warnings,
        }
    }

    fn aggregate(
        &self,
        date: NaiveDate,
        signals: &[Signal],
        warnings: &mut Vec<SimulationWarning>,
    ) -> (BTreeMap<String, f64>, f64) {
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        let mut cash_weight = 0.0;
        let mut participating = 0usize;

        for signal in signals {
            if !signal.is_well_formed() {
                warning::record(
                    warnings,
                    SimulationWarning::new(
                        date,
                        WarningKind::InvalidSignal,
                        Some(signal.symbol.as_str()),
                        format!(
                            "ignored signal with weight {} and confidence {}",
                            signal.target_weight, signal.confidence
                        ),
                    ),
                );
                continue;
            }
            participating += 1;

            if signal.symbol == self.config.cash_symbol {
                cash_weight += signal.effective_weight();
                continue;
            }

            match weights.get_mut(&signal.symbol) {
                Some(existing) => {
                    warning::record(
                        warnings,
                        SimulationWarning::new(
                            date,
                            WarningKind::DuplicateSignal,
                            Some(signal.symbol.as_str()),
                            "multiple signals for one symbol; weights summed".to_string(),
                        ),
                    );
                    *existing += signal.effective_weight();
                }
                None => {
                    weights.insert(signal.symbol.clone(), signal.effective_weight());
                }
            }
        }

        let total: f64 = weights.values().sum::<f64>() + cash_weight;
        if participating > 0 && total <= WEIGHT_EPSILON {
            if let Some(safe) = &self.config.safe_asset {
                info!("{date}: all signals defensive, targeting safe asset {safe}");
                weights.values_mut().for_each(|w| *w = 0.0);
                weights.insert(safe.clone(), 1.0);
            }
        }

        (weights, cash_weight)
    }

    fn normalize(&self, weights: &mut BTreeMap<String, f64>, cash_weight: &mut f64) {
        let total: f64 = weights.values().sum::<f64>() + *cash_weight;
        if total > 1.0 + WEIGHT_EPSILON {
            let scale = 1.0 / total;
            weights.values_mut().for_each(|w| *w *= scale);
            *cash_weight *= scale;
        }
        let invested: f64 = weights.values().sum();
        *cash_weight = (1.0 - invested).max(0.0);
    }

    fn redirect_safe_asset(
        &self,
        date: NaiveDate,
        weights: &mut BTreeMap<String, f64>,
        cash_weight: &mut f64,
        prices: &BTreeMap<String, f64>,
        warnings: &mut Vec<SimulationWarning>,
    ) {
        let Some(safe) = &self.config.safe_asset else {
            return;
        };
        let weight = weights.get(safe).copied().unwrap_or(0.0);
        if weight <= 0.0 {
            return;
        }
        let priced = self.safe_asset_available && prices.contains_key(safe);
        if priced || !self.config.safe_asset_cash_fallback {
            return;
        }
        weights.remove(safe);
        *cash_weight += weight;
        warning::record(
            warnings,
            SimulationWarning::new(
                date,
                WarningKind::SafeAssetFallback,
                Some(safe.as_str()),
                format!("safe asset unavailable; {:.2}% of the portfolio held as cash", weight * 100.0),
            ),
        );
    }

    fn build_intents(
        &self,
        date: NaiveDate,
        book: &PositionBook,
        weights: &BTreeMap<String, f64>,
        portfolio_value: f64,
        prices: &BTreeMap<String, f64>,
        warnings: &mut Vec<SimulationWarning>,
    ) -> Vec<TradeIntent> {
        let symbols: BTreeSet<&str> = book
            .symbols()
            .chain(weights.keys().map(String::as_str))
            .collect();
        let min_trade_value = self.config.rebalance_threshold * portfolio_value.max(0.0);

        let mut sells = Vec::new();
        let mut buys = Vec::new();

        for symbol in symbols {
            let current = book.quantity(symbol);
            let weight = weights.get(symbol).copied().unwrap_or(0.0);

            let Some(&price) = prices.get(symbol) else {
                if current > QUANTITY_EPSILON && !weights.contains_key(symbol) {
                    warning::record(
                        warnings,
                        SimulationWarning::new(
                            date,
                            WarningKind::MissingPrice,
                            Some(symbol),
                            "position should be closed but has no price; held until priced".to_string(),
                        ),
                    );
                }
                continue;
            };

            if weight <= 0.0 {
                if current > QUANTITY_EPSILON {
                    sells.push(TradeIntent::sell_all(symbol, current));
                }
                continue;
            }

            let target = portfolio_value * weight / price;
            let delta = target - current;
            if delta.abs() <= QUANTITY_EPSILON || delta.abs() * price <= min_trade_value {
                continue;
            }

            let intent = TradeIntent {
                symbol: symbol.to_string(),
                action: if delta < 0.0 {
                    TradeAction::Sell
                } else {
                    TradeAction::Buy
                },
                target_quantity: target,
                current_quantity: current,
            };
            match intent.action {
                TradeAction::Sell => sells.push(intent),
                TradeAction::Buy => buys.push(intent),
            }
        }

        sells.extend(buys);
        sells
    }
}

/// Zero unpriced weights, leaving their share in cash. Returns the risk share.
fn apply_risk_share(
    date: NaiveDate,
    weights: &mut BTreeMap<String, f64>,
    cash_weight: &mut f64,
    prices: &BTreeMap<String, f64>,
    warnings: &mut Vec<SimulationWarning>,
) -> f64 {
    let desired: Vec<String> = weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(sym, _)| sym.clone())
        .collect();
    if desired.is_empty() {
        return 1.0;
    }

    let mut residual = 0.0;
    for symbol in &desired {
        if prices.contains_key(symbol) {
            continue;
        }
        let weight = weights.insert(symbol.clone(), 0.0).unwrap_or(0.0);
        residual += weight;
        warning::record(
            warnings,
            SimulationWarning::new(
                date,
                WarningKind::MissingPrice,
                Some(symbol.as_str()),
                format!("no price; target weight {:.4} kept in cash", weight),
            ),
        );
    }

    let tradable = desired.iter().filter(|s| prices.contains_key(*s)).count();
    let risk_share = tradable as f64 / desired.len() as f64;
    if tradable < desired.len() {
        *cash_weight += residual;
        warning::record(
            warnings,
            SimulationWarning::new(
                date,
                WarningKind::RiskShareScaled,
                None,
                format!(
                    "risk share {:.2} ({} of {} symbols priced); {:.2}% routed to cash",
                    risk_share,
                    tradable,
                    desired.len(),
                    residual * 100.0
                ),
            ),
        );
    }
    risk_share
}
