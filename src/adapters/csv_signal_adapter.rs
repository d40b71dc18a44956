//! Signal schedule loader.
//!
//! Reads `date,symbol,target_weight[,direction][,reason][,confidence]` rows
//! into a [`SignalSchedule`]. Rows sharing a date form one signal set.

use crate::domain::error::AllotraderError;
use crate::domain::signal::{Direction, Signal, SignalReason};
use crate::domain::strategy::SignalSchedule;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SignalRow {
    date: NaiveDate,
    symbol: String,
    target_weight: f64,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl SignalRow {
    fn into_signal(self) -> Result<(NaiveDate, Signal), String> {
        let direction = match self.direction.as_deref().map(str::trim) {
            None | Some("") => Direction::Long,
            Some(value) => value.parse::<Direction>().map_err(|e| e.to_string())?,
        };
        let reason = match self.reason.as_deref() {
            None => SignalReason::Other,
            Some(value) => value.parse::<SignalReason>().map_err(|e| e.to_string())?,
        };
        Ok((
            self.date,
            Signal {
                symbol: self.symbol.trim().to_uppercase(),
                target_weight: self.target_weight,
                direction,
                reason,
                confidence: self.confidence.unwrap_or(1.0),
            },
        ))
    }
}

pub fn load_signal_schedule(path: &Path) -> Result<SignalSchedule, AllotraderError> {
    let file_error = |reason: String| AllotraderError::SignalFile {
        file: path.display().to_string(),
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| file_error(e.to_string()))?;

    let mut schedule = SignalSchedule::new();
    for (line, row) in rdr.deserialize::<SignalRow>().enumerate() {
        let row = row.map_err(|e| file_error(format!("row {}: {}", line + 1, e)))?;
        let (date, signal) = row
            .into_signal()
            .map_err(|e| file_error(format!("row {}: {}", line + 1, e)))?;
        schedule.entry(date).or_default().push(signal);
    }

    if schedule.is_empty() {
        return Err(file_error("no signals".to_string()));
    }
    Ok(schedule)
}
