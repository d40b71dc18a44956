//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::AllotraderError;
use crate::domain::metrics::Metrics;

/// Port for exporting a finished simulation.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, metrics: &Metrics) -> Result<(), AllotraderError>;
}
