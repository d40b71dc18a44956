//! Price data access port.

use crate::domain::error::AllotraderError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` with `start_date <= date <= end_date`, in any order.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, AllotraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, AllotraderError>;
}
