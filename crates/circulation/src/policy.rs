//! Loan duration and renewal rules.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::CirculationError;
use crate::fine::{DailyRateFine, FineCalculator};

/// Tunable limits for loans on a single item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPolicy {
    /// Latest allowed due date, in days from the borrow date.
    pub max_loan_days: u32,
    /// Days added to the due date by one renewal.
    pub renewal_days: u32,
    pub max_renewals: u32,
    /// Below this many available copies, renewals yield to the queue head.
    pub low_stock_threshold: u32,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            max_loan_days: 4,
            renewal_days: 7,
            max_renewals: 2,
            low_stock_threshold: 2,
        }
    }
}

impl LoanPolicy {
    /// Inclusive range of due dates accepted for a loan starting `today`.
    /// The upper bound saturates at the last representable date.
    pub fn due_date_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let latest = today
            .checked_add_days(Days::new(u64::from(self.max_loan_days)))
            .unwrap_or(NaiveDate::MAX);
        (today, latest)
    }

    pub fn check_due_date(&self, today: NaiveDate, due_date: NaiveDate) -> Result<(), CirculationError> {
        let (earliest, latest) = self.due_date_window(today);
        if due_date < earliest || due_date > latest {
            return Err(CirculationError::InvalidDueDate {
                due_date,
                earliest,
                latest,
            });
        }
        Ok(())
    }

    pub fn renewed_due_date(&self, due_date: NaiveDate) -> Result<NaiveDate, CirculationError> {
        due_date
            .checked_add_days(Days::new(u64::from(self.renewal_days)))
            .ok_or(CirculationError::InvalidDueDate {
                due_date,
                earliest: due_date,
                latest: NaiveDate::MAX,
            })
    }
}

/// Everything the loan state machine consults besides its own state.
#[derive(Debug, Clone)]
pub struct CirculationRules {
    pub loans: LoanPolicy,
    pub fines: Arc<dyn FineCalculator>,
}

impl CirculationRules {
    pub fn new(loans: LoanPolicy, fines: impl FineCalculator + 'static) -> Self {
        Self {
            loans,
            fines: Arc::new(fines),
        }
    }
}

impl Default for CirculationRules {
    fn default() -> Self {
        Self::new(LoanPolicy::default(), DailyRateFine::default())
    }
}
