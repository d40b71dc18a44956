//! Free-cash ledger.

/// Shortfalls up to this size are absorbed as floating-point noise.
pub const CASH_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient cash: need {needed:.6}, have {available:.6}")]
    InsufficientCash { needed: f64, available: f64 },

    #[error("invalid cash amount: {0}")]
    InvalidAmount(f64),
}

/// Holds the single free-cash balance. `free_cash >= 0` always.
#[derive(Debug, Clone, PartialEq)]
pub struct CashLedger {
    free_cash: f64,
}

impl CashLedger {
    pub fn new(initial_cash: f64) -> Self {
        CashLedger {
            free_cash: initial_cash.max(0.0),
        }
    }

    pub fn free_cash(&self) -> f64 {
        self.free_cash
    }

    pub fn credit(&mut self, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.free_cash += amount;
        Ok(())
    }

    /// Debit `amount`; the balance is left untouched on error.
    pub fn debit(&mut self, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount > self.free_cash + CASH_EPSILON {
            return Err(LedgerError::InsufficientCash {
                needed: amount,
                available: self.free_cash,
            });
        }
        self.free_cash = (self.free_cash - amount).max(0.0);
        Ok(())
    }

    /// Apply a signed settlement: positive credits, negative debits.
    pub fn settle(&mut self, net: f64) -> Result<(), LedgerError> {
        if net >= 0.0 {
            self.credit(net)
        } else {
            self.debit(-net)
        }
    }
}
