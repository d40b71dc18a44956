//! Signal source port.
//!
//! A signal source is the strategy side of the simulator: it decides target
//! weights, the simulator turns them into trades.

use crate::domain::price_store::PriceView;
use crate::domain::signal::Signal;
use chrono::NaiveDate;

pub trait SignalSource {
    fn name(&self) -> &str;

    /// Every symbol this source may ever signal. Each must have price data
    /// covering the simulated range.
    fn universe(&self) -> Vec<String>;

    /// Target allocation for `date`. Called at most once per rebalance date;
    /// `prices` exposes nothing after `date`.
    fn signals(&mut self, date: NaiveDate, prices: &PriceView<'_>) -> Vec<Signal>;
}
