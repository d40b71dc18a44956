//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod cost;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod metrics;
pub mod ohlcv;
pub mod portfolio;
pub mod position;
pub mod position_book;
pub mod price_store;
pub mod rebalancer;
pub mod signal;
pub mod strategy;
pub mod universe;
pub mod warning;
