//! Domain error types.
//!
//! Only fatal conditions live here. Recoverable runtime conditions are
//! reported as [`SimulationWarning`](super::warning::SimulationWarning) values
//! and never abort a run.

/// Top-level error type for allotrader.
#[derive(Debug, thiserror::Error)]
pub enum AllotraderError {
    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy '{name}' (available: {available})")]
    UnknownStrategy { name: String, available: String },

    #[error("invalid signal file {file}: {reason}")]
    SignalFile { file: String, reason: String },

    #[error(
        "no price data for {}; add the data for these symbols, \
         or remove them from the strategy universe",
        symbols.join(", ")
    )]
    MissingPriceData { symbols: Vec<String> },

    #[error(
        "price data for {symbol} covers {first} to {last}, but the simulation \
         runs {start} to {end}; provide the missing history or shorten the date range"
    )]
    IncompleteCoverage {
        symbol: String,
        first: chrono::NaiveDate,
        last: chrono::NaiveDate,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error(
        "safe asset {symbol} has no usable price data; provide data for {symbol}, \
         remove safe_asset from [backtest], or set safe_asset_cash_fallback = true"
    )]
    SafeAssetUnavailable { symbol: String },

    #[error("no trading dates between {start} and {end}")]
    EmptyCalendar {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AllotraderError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        AllotraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config_missing(section: &str, key: &str) -> Self {
        AllotraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&AllotraderError> for std::process::ExitCode {
    fn from(err: &AllotraderError) -> Self {
        let code: u8 = match err {
            AllotraderError::Io(_) => 1,
            AllotraderError::ConfigParse { .. }
            | AllotraderError::ConfigMissing { .. }
            | AllotraderError::ConfigInvalid { .. } => 2,
            AllotraderError::DataSource { .. } => 3,
            AllotraderError::UnknownStrategy { .. } | AllotraderError::SignalFile { .. } => 4,
            AllotraderError::MissingPriceData { .. }
            | AllotraderError::IncompleteCoverage { .. }
            | AllotraderError::SafeAssetUnavailable { .. }
            | AllotraderError::EmptyCalendar { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_price_data_names_every_symbol() {
        let err = AllotraderError::MissingPriceData {
            symbols: vec!["QQQ".into(), "VNQ".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("QQQ, VNQ"));
        assert!(msg.contains("remove them from the strategy universe"));
    }

    #[test]
    fn safe_asset_error_lists_remediation() {
        let err = AllotraderError::SafeAssetUnavailable {
            symbol: "TLT".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("TLT"));
        assert!(msg.contains("safe_asset_cash_fallback"));
    }

    #[test]
    fn config_helpers_fill_section_and_key() {
        let err = AllotraderError::config_invalid("backtest", "initial_cash", "must be positive");
        assert!(matches!(
            err,
            AllotraderError::ConfigInvalid { ref section, ref key, .. }
                if section == "backtest" && key == "initial_cash"
        ));
        let err = AllotraderError::config_missing("strategy", "name");
        assert_eq!(err.to_string(), "missing config key [strategy] name");
    }
}
