//! allotrader: portfolio rebalancing and trade-execution simulator.
//!
//! Turns a time-ordered series of target allocations into cash-accurate
//! trades, positions and daily snapshots. Hexagonal layout: domain logic in
//! [`domain`], port traits in [`ports`], concrete implementations in
//! [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
