//! Structured warnings for recoverable runtime conditions.
//!
//! Every substitution the simulator makes (missing prices, partial fills, safe
//! asset redirected to cash) is recorded here and attached to the snapshot of
//! the date it happened on.

use chrono::NaiveDate;
use log::warn;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A signalled or held symbol had no tradable price on a rebalance date.
    MissingPrice,
    /// A held position kept its previous mark because the day had no price.
    StaleMark,
    /// Some desired symbols could not be priced; their share stayed in cash.
    RiskShareScaled,
    /// Safe-asset weight was redirected to cash.
    SafeAssetFallback,
    /// A buy was scaled down to the affordable quantity.
    PartialFill,
    /// An intent could not be executed at all.
    SkippedTrade,
    /// A malformed signal was ignored.
    InvalidSignal,
    /// Several signals named the same symbol and were merged.
    DuplicateSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationWarning {
    pub date: NaiveDate,
    pub kind: WarningKind,
    pub symbol: Option<String>,
    pub message: String,
}

impl SimulationWarning {
    pub fn new(date: NaiveDate, kind: WarningKind, symbol: Option<&str>, message: String) -> Self {
        SimulationWarning {
            date,
            kind,
            symbol: symbol.map(str::to_string),
            message,
        }
    }
}

impl fmt::Display for SimulationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{} [{:?}] {}: {}", self.date, self.kind, symbol, self.message),
            None => write!(f, "{} [{:?}] {}", self.date, self.kind, self.message),
        }
    }
}

/// Log a warning and keep it.
pub fn record(warnings: &mut Vec<SimulationWarning>, warning: SimulationWarning) {
    warn!("{warning}");
    warnings.push(warning);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn display_includes_symbol_when_present() {
        let w = SimulationWarning::new(
            date(),
            WarningKind::PartialFill,
            Some("SPY"),
            "filled 9.9 of 10".into(),
        );
        assert_eq!(w.to_string(), "2024-03-01 [PartialFill] SPY: filled 9.9 of 10");
    }

    #[test]
    fn display_without_symbol() {
        let w = SimulationWarning::new(
            date(),
            WarningKind::RiskShareScaled,
            None,
            "risk share 0.50".into(),
        );
        assert_eq!(w.to_string(), "2024-03-01 [RiskShareScaled] risk share 0.50");
    }

    #[test]
    fn record_appends() {
        let mut warnings = Vec::new();
        record(
            &mut warnings,
            SimulationWarning::new(date(), WarningKind::StaleMark, Some("TLT"), "no close".into()),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].symbol.as_deref(), Some("TLT"));
    }
}
