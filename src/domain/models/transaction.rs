use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::CASH_TOLERANCE;

/// Outcome of comparing counted cash against the expected position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationStatus {
    /// No ending cash recorded yet.
    Pending,
    /// Variance within tolerance.
    Balanced,
    /// Negative variance beyond tolerance.
    Shortage,
    /// Positive variance beyond tolerance.
    Over,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Pending => "Pending",
            ReconciliationStatus::Balanced => "Balanced",
            ReconciliationStatus::Shortage => "Shortage",
            ReconciliationStatus::Over => "Over",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(ReconciliationStatus::Pending),
            "Balanced" => Some(ReconciliationStatus::Balanced),
            "Shortage" => Some(ReconciliationStatus::Shortage),
            "Over" => Some(ReconciliationStatus::Over),
            _ => None,
        }
    }

    /// Classify a variance against the cash tolerance. `None` means no
    /// ending cash has been recorded, so the record stays pending.
    pub fn from_variance(variance: Option<f64>) -> Self {
        match variance {
            None => ReconciliationStatus::Pending,
            Some(v) if v.abs() <= CASH_TOLERANCE => ReconciliationStatus::Balanced,
            Some(v) if v < 0.0 => ReconciliationStatus::Shortage,
            Some(_) => ReconciliationStatus::Over,
        }
    }
}

/// One reconciliation record: the cash movements of a single ATM on a single
/// calendar date, compared against the counted ending cash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtmTransaction {
    pub id: i64,
    pub atm_id: i64,
    pub transaction_date: NaiveDate,
    pub beginning_cash: Option<f64>,
    pub added_cash: Option<f64>,
    pub recycled_cash: Option<f64>,
    pub ending_cash: Option<f64>,
    pub deposited_cash: Option<f64>,
    pub gl_balance: Option<f64>,
    pub is_reconciled: bool,
    pub status: ReconciliationStatus,
    pub variance: Option<f64>,
    pub notes: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl AtmTransaction {
    pub fn new(atm_id: i64, transaction_date: NaiveDate) -> Self {
        Self {
            id: 0,
            atm_id,
            transaction_date,
            beginning_cash: None,
            added_cash: None,
            recycled_cash: None,
            ending_cash: None,
            deposited_cash: None,
            gl_balance: None,
            is_reconciled: false,
            status: ReconciliationStatus::Pending,
            variance: None,
            notes: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Expected ending cash: beginning + added + recycled - deposited,
    /// treating unset fields as zero.
    pub fn calculated_cash(&self) -> f64 {
        self.beginning_cash.unwrap_or(0.0)
            + self.added_cash.unwrap_or(0.0)
            + self.recycled_cash.unwrap_or(0.0)
            - self.deposited_cash.unwrap_or(0.0)
    }

    /// Counted ending cash minus the expected position. Zero until an
    /// ending cash value is recorded.
    pub fn calculated_variance(&self) -> f64 {
        match self.ending_cash {
            Some(ending) => ending - self.calculated_cash(),
            None => 0.0,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.calculated_variance().abs() <= CASH_TOLERANCE
    }

    /// Status implied by the current cash fields.
    pub fn derived_status(&self) -> ReconciliationStatus {
        ReconciliationStatus::from_variance(self.ending_cash.map(|_| self.calculated_variance()))
    }
}
