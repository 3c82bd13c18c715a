//! Loan records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shelf_core::{BorrowerId, LoanId};

use crate::fine::FineCalculator;
use crate::item::ItemId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanStatus {
    /// Drafted, copy not yet taken off the shelf.
    Pending,
    Active,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Returned => "RETURNED",
            LoanStatus::Overdue => "OVERDUE",
        }
    }
}

impl core::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One borrower's loan of one copy of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub(crate) id: LoanId,
    pub(crate) borrower_id: BorrowerId,
    pub(crate) item_id: ItemId,
    pub(crate) status: LoanStatus,
    pub(crate) renewal_count: u32,
    /// Fine currently owed, in minor units.
    pub(crate) fine_amount: u64,
    /// Fines already settled on this loan, in minor units.
    pub(crate) fines_paid: u64,
    pub(crate) borrowed_date: NaiveDate,
    pub(crate) due_date: NaiveDate,
    pub(crate) return_date: Option<NaiveDate>,
}

impl Loan {
    pub fn id(&self) -> LoanId {
        self.id
    }

    pub fn borrower_id(&self) -> BorrowerId {
        self.borrower_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn renewal_count(&self) -> u32 {
        self.renewal_count
    }

    pub fn fine_amount(&self) -> u64 {
        self.fine_amount
    }

    pub fn fines_paid(&self) -> u64 {
        self.fines_paid
    }

    pub fn borrowed_date(&self) -> NaiveDate {
        self.borrowed_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        self.return_date
    }

    /// Counts against the one-open-loan-per-borrower-per-item rule.
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
            && matches!(
                self.status,
                LoanStatus::Pending | LoanStatus::Active | LoanStatus::Overdue
            )
    }

    /// Holds a copy off the shelf.
    pub fn is_checked_out(&self) -> bool {
        self.return_date.is_none() && matches!(self.status, LoanStatus::Active | LoanStatus::Overdue)
    }

    /// Signed number of days between the due date and `on`.
    pub fn days_late(&self, on: NaiveDate) -> i64 {
        (on - self.due_date).num_days()
    }

    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.is_checked_out() && today > self.due_date
    }

    /// Fine for every day late as of `on`. Earlier payments do not reduce it.
    pub fn accrued_fine(&self, on: NaiveDate, fines: &dyn FineCalculator) -> u64 {
        fines.fine(self.days_late(on))
    }

    /// Whether the overdue sweep would change this loan today.
    pub fn needs_overdue_sweep(&self, today: NaiveDate, fines: &dyn FineCalculator) -> bool {
        if !self.is_past_due(today) {
            return false;
        }
        self.status != LoanStatus::Overdue || self.fine_amount != self.accrued_fine(today, fines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fine::DailyRateFine;
    use shelf_core::AggregateId;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn active_loan(due: NaiveDate) -> Loan {
        Loan {
            id: LoanId::new(),
            borrower_id: BorrowerId::new(),
            item_id: ItemId::new(AggregateId::new()),
            status: LoanStatus::Active,
            renewal_count: 0,
            fine_amount: 0,
            fines_paid: 0,
            borrowed_date: day(1),
            due_date: due,
            return_date: None,
        }
    }

    #[test]
    fn sweep_triggers_only_after_due_date() {
        let fines = DailyRateFine::default();
        let loan = active_loan(day(5));
        assert!(!loan.needs_overdue_sweep(day(5), &fines));
        assert!(loan.needs_overdue_sweep(day(6), &fines));
    }

    #[test]
    fn accrued_fine_covers_every_day_late() {
        let fines = DailyRateFine::default();
        let mut loan = active_loan(day(5));
        loan.status = LoanStatus::Overdue;
        loan.fines_paid = 200;
        assert_eq!(loan.accrued_fine(day(7), &fines), 200);
        assert_eq!(loan.accrued_fine(day(8), &fines), 300);

        // A paid fine is reassessed by the next sweep.
        assert!(loan.needs_overdue_sweep(day(7), &fines));
        loan.fine_amount = 200;
        assert!(!loan.needs_overdue_sweep(day(7), &fines));
    }

    #[test]
    fn returned_loans_are_closed() {
        let mut loan = active_loan(day(5));
        loan.status = LoanStatus::Returned;
        loan.return_date = Some(day(4));
        assert!(!loan.is_open());
        assert!(!loan.is_past_due(day(20)));
    }

    #[test]
    fn status_displays_in_wire_form() {
        assert_eq!(LoanStatus::Overdue.to_string(), "OVERDUE");
    }
}
