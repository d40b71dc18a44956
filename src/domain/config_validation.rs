//! Configuration validation.
//!
//! Runs eagerly on the typed [`BacktestConfig`] before any price is loaded
//! or any trade simulated.

use crate::domain::backtest::BacktestConfig;
use crate::domain::error::AllotraderError;

pub fn validate_backtest_config(config: &BacktestConfig) -> Result<(), AllotraderError> {
    validate_initial_cash(config)?;
    validate_costs(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    validate_threshold(config)?;
    validate_symbols(config)?;
    Ok(())
}

fn validate_initial_cash(config: &BacktestConfig) -> Result<(), AllotraderError> {
    if !config.initial_cash.is_finite() || config.initial_cash <= 0.0 {
        return Err(AllotraderError::config_invalid(
            "backtest",
            "initial_cash",
            "initial_cash must be positive",
        ));
    }
    Ok(())
}

fn validate_costs(config: &BacktestConfig) -> Result<(), AllotraderError> {
    for (key, value) in [
        ("commission_rate", config.commission_rate),
        ("slippage_rate", config.slippage_rate),
    ] {
        if !value.is_finite() || !(0.0..1.0).contains(&value) {
            return Err(AllotraderError::config_invalid(
                "backtest",
                key,
                format!("{key} must be in [0, 1)"),
            ));
        }
    }
    if !config.commission_per_trade.is_finite() || config.commission_per_trade < 0.0 {
        return Err(AllotraderError::config_invalid(
            "backtest",
            "commission_per_trade",
            "commission_per_trade must be non-negative",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &BacktestConfig) -> Result<(), AllotraderError> {
    if !(0.0..1.0).contains(&config.risk_free_rate) {
        return Err(AllotraderError::config_invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_dates(config: &BacktestConfig) -> Result<(), AllotraderError> {
    if config.start_date >= config.end_date {
        return Err(AllotraderError::config_invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_threshold(config: &BacktestConfig) -> Result<(), AllotraderError> {
    if !(0.0..1.0).contains(&config.rebalance_threshold) {
        return Err(AllotraderError::config_invalid(
            "backtest",
            "rebalance_threshold",
            "rebalance_threshold must be in [0, 1)",
        ));
    }
    Ok(())
}

fn validate_symbols(config: &BacktestConfig) -> Result<(), AllotraderError> {
    if config.cash_symbol.trim().is_empty() {
        return Err(AllotraderError::config_invalid(
            "backtest",
            "cash_symbol",
            "cash_symbol must not be empty",
        ));
    }
    if let Some(safe) = &config.safe_asset {
        if safe.trim().is_empty() {
            return Err(AllotraderError::config_invalid(
                "backtest",
                "safe_asset",
                "safe_asset must not be empty when set",
            ));
        }
        if safe.eq_ignore_ascii_case(&config.cash_symbol) {
            return Err(AllotraderError::config_invalid(
                "backtest",
                "safe_asset",
                format!("safe_asset {safe} is the cash symbol; leave safe_asset unset to hold cash"),
            ));
        }
    }
    Ok(())
}
