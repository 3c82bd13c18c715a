//! Late-return fine policy.

use serde::{Deserialize, Serialize};

/// Computes the fine owed for a number of days late.
///
/// Implementations must return 0 for `days_late <= 0` and be non-decreasing
/// in `days_late`. Amounts are in minor currency units.
pub trait FineCalculator: core::fmt::Debug + Send + Sync {
    fn fine(&self, days_late: i64) -> u64;
}

/// Flat per-day rate with an optional grace period and ceiling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRateFine {
    pub per_day: u64,
    pub grace_days: u32,
    pub cap: Option<u64>,
}

impl DailyRateFine {
    pub fn new(per_day: u64) -> Self {
        Self {
            per_day,
            grace_days: 0,
            cap: None,
        }
    }

    pub fn with_grace_days(mut self, grace_days: u32) -> Self {
        self.grace_days = grace_days;
        self
    }

    pub fn with_cap(mut self, cap: u64) -> Self {
        self.cap = Some(cap);
        self
    }
}

impl Default for DailyRateFine {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FineCalculator for DailyRateFine {
    fn fine(&self, days_late: i64) -> u64 {
        let billable = days_late - i64::from(self.grace_days);
        if billable <= 0 {
            return 0;
        }
        let amount = self.per_day.saturating_mul(billable as u64);
        match self.cap {
            Some(cap) => amount.min(cap),
            None => amount,
        }
    }
}
