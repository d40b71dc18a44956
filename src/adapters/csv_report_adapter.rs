//! Plain CSV export of a finished simulation.
//!
//! Writes `trades.csv`, `equity.csv` (one row per snapshot, one value column
//! per symbol ever held) and `warnings.csv` into an output directory.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::AllotraderError;
use crate::domain::metrics::Metrics;
use crate::ports::report_port::ReportPort;
use log::info;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const TRADES_FILE: &str = "trades.csv";
pub const EQUITY_FILE: &str = "equity.csv";
pub const WARNINGS_FILE: &str = "warnings.csv";

pub struct CsvReportAdapter {
    output_dir: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn writer(&self, name: &str) -> Result<csv::Writer<fs::File>, AllotraderError> {
        let path = self.output_dir.join(name);
        csv::Writer::from_path(&path).map_err(|e| csv_error(&path, e))
    }

    fn write_trades(&self, result: &BacktestResult) -> Result<(), AllotraderError> {
        let path = self.output_dir.join(TRADES_FILE);
        let mut wtr = self.writer(TRADES_FILE)?;
        for trade in &result.trades {
            wtr.serialize(trade).map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_equity(&self, result: &BacktestResult) -> Result<(), AllotraderError> {
        let path = self.output_dir.join(EQUITY_FILE);
        let symbols: BTreeSet<&str> = result
            .snapshots
            .iter()
            .flat_map(|s| s.positions.keys().map(String::as_str))
            .collect();

        let mut wtr = self.writer(EQUITY_FILE)?;
        let mut header = vec!["date", "cash", "total_value", "rebalanced", "warnings"];
        header.extend(symbols.iter().copied());
        wtr.write_record(&header).map_err(|e| csv_error(&path, e))?;

        for snap in &result.snapshots {
            let mut row = vec![
                snap.date.to_string(),
                format!("{:.6}", snap.cash),
                format!("{:.6}", snap.total_value),
                snap.rebalanced.to_string(),
                snap.warnings.len().to_string(),
            ];
            row.extend(symbols.iter().map(|sym| {
                format!("{:.6}", snap.positions.get(*sym).copied().unwrap_or(0.0))
            }));
            wtr.write_record(&row).map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_warnings(&self, result: &BacktestResult) -> Result<(), AllotraderError> {
        let path = self.output_dir.join(WARNINGS_FILE);
        let mut wtr = self.writer(WARNINGS_FILE)?;
        wtr.write_record(["date", "kind", "symbol", "message"])
            .map_err(|e| csv_error(&path, e))?;
        for warning in result.warnings() {
            wtr.serialize((
                warning.date,
                warning.kind,
                warning.symbol.as_deref().unwrap_or(""),
                &warning.message,
            ))
            .map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, metrics: &Metrics) -> Result<(), AllotraderError> {
        fs::create_dir_all(&self.output_dir)?;
        self.write_trades(result)?;
        self.write_equity(result)?;
        self.write_warnings(result)?;
        info!(
            "wrote {} trades, {} snapshots, {} warnings to {} (total return {:.2}%)",
            result.trades.len(),
            result.snapshots.len(),
            metrics.warning_count,
            self.output_dir.display(),
            metrics.total_return * 100.0
        );
        Ok(())
    }
}

fn csv_error(path: &Path, e: csv::Error) -> AllotraderError {
    AllotraderError::Io(std::io::Error::other(format!(
        "failed to write {}: {}",
        path.display(),
        e
    )))
}
