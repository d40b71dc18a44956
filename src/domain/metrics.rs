//! Performance metrics computed from the snapshot stream and trade log.

use super::backtest::BacktestResult;
use super::portfolio::PortfolioSnapshot;
use super::position::{Trade, TradeAction};
use std::collections::BTreeMap;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of snapshots spent below a previous peak.
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub buys: usize,
    pub sells: usize,
    pub rebalance_count: usize,
    pub total_commission: f64,
    pub total_slippage: f64,
    /// Traded notional over average portfolio value.
    pub turnover: f64,
    pub sells_won: usize,
    pub sells_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub warning_count: usize,
}

impl Metrics {
    pub fn compute(result: &BacktestResult, risk_free_rate: f64) -> Self {
        let snapshots = &result.snapshots;
        let trades = &result.trades;
        let initial_cash = result.initial_cash;
        let final_value = result.final_value();

        let total_return = if initial_cash > 0.0 {
            (final_value - initial_cash) / initial_cash
        } else {
            0.0
        };

        let years = snapshots.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(snapshots);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(snapshots, daily_rf);

        let buys = trades.iter().filter(|t| t.action == TradeAction::Buy).count();
        let sells = trades.len() - buys;
        let total_commission: f64 = trades.iter().map(|t| t.commission).sum();
        let total_slippage: f64 = trades.iter().map(|t| t.slippage).sum();

        let traded_notional: f64 = trades.iter().map(Trade::notional).sum();
        let avg_value = if snapshots.is_empty() {
            initial_cash
        } else {
            snapshots.iter().map(|s| s.total_value).sum::<f64>() / snapshots.len() as f64
        };
        let turnover = if avg_value > 0.0 {
            traded_notional / avg_value
        } else {
            0.0
        };

        let mut sells_won = 0usize;
        let mut sells_lost = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trade in trades.iter().filter(|t| t.action == TradeAction::Sell) {
            let pnl = trade.realized_pnl;
            if pnl > 0.0 {
                sells_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                sells_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            }
        }

        let win_rate = if sells > 0 {
            sells_won as f64 / sells as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if sells_won > 0 {
            total_wins / sells_won as f64
        } else {
            0.0
        };

        let avg_loss = if sells_lost > 0 {
            total_losses / sells_lost as f64
        } else {
            0.0
        };

        Metrics {
            final_value,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.len(),
            buys,
            sells,
            rebalance_count: snapshots.iter().filter(|s| s.rebalanced).count(),
            total_commission,
            total_slippage,
            turnover,
            sells_won,
            sells_lost,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            warning_count: result.warning_count(),
        }
    }

    pub fn total_costs(&self) -> f64 {
        self.total_commission + self.total_slippage
    }
}

/// Trading activity for one symbol across the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSummary {
    pub symbol: String,
    pub buys: usize,
    pub sells: usize,
    pub bought_notional: f64,
    pub sold_notional: f64,
    pub costs: f64,
    pub realized_pnl: f64,
    /// Sale proceeds less purchase outlays, all net of costs.
    pub net_cash_flow: f64,
}

impl SymbolSummary {
    fn new(symbol: &str) -> Self {
        SymbolSummary {
            symbol: symbol.to_string(),
            buys: 0,
            sells: 0,
            bought_notional: 0.0,
            sold_notional: 0.0,
            costs: 0.0,
            realized_pnl: 0.0,
            net_cash_flow: 0.0,
        }
    }

    /// Per-symbol summaries ordered by symbol.
    pub fn compute_per_symbol(trades: &[Trade]) -> Vec<SymbolSummary> {
        let mut by_symbol: BTreeMap<&str, SymbolSummary> = BTreeMap::new();
        for trade in trades {
            let entry = by_symbol
                .entry(trade.symbol.as_str())
                .or_insert_with(|| SymbolSummary::new(&trade.symbol));
            entry.costs += trade.costs();
            entry.net_cash_flow += trade.cash_flow();
            match trade.action {
                TradeAction::Buy => {
                    entry.buys += 1;
                    entry.bought_notional += trade.notional();
                }
                TradeAction::Sell => {
                    entry.sells += 1;
                    entry.sold_notional += trade.notional();
                    entry.realized_pnl += trade.realized_pnl;
                }
            }
        }
        by_symbol.into_values().collect()
    }
}

fn compute_drawdown(snapshots: &[PortfolioSnapshot]) -> (f64, i64) {
    let Some(first) = snapshots.first() else {
        return (0.0, 0);
    };

    let mut peak = first.total_value;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for snap in snapshots {
        if snap.total_value >= peak {
            peak = snap.total_value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - snap.total_value) / peak;
            max_dd = max_dd.max(dd);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(snapshots: &[PortfolioSnapshot], daily_rf: f64) -> (f64, f64) {
    if snapshots.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = snapshots
        .windows(2)
        .map(|w| {
            let prev = w[0].total_value;
            if prev > 0.0 {
                (w[1].total_value - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
