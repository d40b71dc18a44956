//! OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// A close that can be traded against: finite and strictly positive.
    pub fn tradable_close(&self) -> Option<f64> {
        if self.close.is_finite() && self.close > 0.0 {
            Some(self.close)
        } else {
            None
        }
    }
}
