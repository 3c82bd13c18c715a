//! Loan state machine for one item.
//!
//! `LoanLifecycle` is the aggregate: it wraps the item's [`ItemCirculation`]
//! state together with the [`CirculationRules`] it is judged by, and turns
//! commands into events. Every check runs against a copy of the state, so a
//! rejected command leaves nothing behind.
//!
//! ```text
//! PENDING --approve--> ACTIVE --renew--> ACTIVE
//!                        |  \--sweep--> OVERDUE --return--> OVERDUE (returned)
//!                        \--return--> RETURNED
//! ```

use chrono::NaiveDate;

use shelf_core::{Aggregate, AggregateRoot, LoanId};

use crate::borrower::BorrowerSnapshot;
use crate::command::{
    ApproveLoan, CancelReservation, CheckOutLoan, CheckOutReservation, CirculationCommand,
    MarkOverdue, PayFine, PlaceReservation, RegisterItem, RenewLoan, RequestLoan, ReturnLoan,
    ReviseTotalCopies,
};
use crate::error::CirculationError;
use crate::event::{
    CirculationEvent, FinePaid, ItemRegistered, LoanApproved, LoanCheckedOut, LoanMarkedOverdue,
    LoanRenewed, LoanRequested, LoanReturned, ReservationCancelled, ReservationFulfilled,
    ReservationPlaced, TotalCopiesRevised,
};
use crate::item::{ItemCirculation, ItemId};
use crate::loan::{Loan, LoanStatus};
use crate::policy::CirculationRules;

/// Aggregate type name of item circulation streams.
pub const AGGREGATE_TYPE: &str = "circulation.item";

type Decision = Result<Vec<CirculationEvent>, CirculationError>;

#[derive(Debug, Clone)]
pub struct LoanLifecycle {
    state: ItemCirculation,
    rules: CirculationRules,
}

impl LoanLifecycle {
    /// Create an empty, not-yet-registered instance for rehydration.
    pub fn empty(id: ItemId, rules: CirculationRules) -> Self {
        Self {
            state: ItemCirculation::empty(id),
            rules,
        }
    }

    pub fn state(&self) -> &ItemCirculation {
        &self.state
    }

    pub fn into_state(self) -> ItemCirculation {
        self.state
    }

    pub fn rules(&self) -> &CirculationRules {
        &self.rules
    }

    /// Loans the overdue sweep would change on `today`.
    pub fn loans_needing_sweep(&self, today: NaiveDate) -> Vec<LoanId> {
        self.state
            .loans()
            .iter()
            .filter(|l| l.needs_overdue_sweep(today, self.rules.fines.as_ref()))
            .map(Loan::id)
            .collect()
    }
}

impl AggregateRoot for LoanLifecycle {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        self.state.id()
    }

    fn version(&self) -> u64 {
        self.state.version()
    }
}

impl Aggregate for LoanLifecycle {
    type Command = CirculationCommand;
    type Event = CirculationEvent;
    type Error = CirculationError;

    fn apply(&mut self, event: &Self::Event) {
        self.state.apply(event);
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CirculationCommand::RegisterItem(cmd) => self.handle_register(cmd),
            CirculationCommand::ReviseTotalCopies(cmd) => self.handle_revise(cmd),
            CirculationCommand::RequestLoan(cmd) => self.handle_request(cmd),
            CirculationCommand::ApproveLoan(cmd) => self.handle_approve(cmd),
            CirculationCommand::CheckOutLoan(cmd) => self.handle_check_out(cmd),
            CirculationCommand::CheckOutReservation(cmd) => self.handle_check_out_reservation(cmd),
            CirculationCommand::RenewLoan(cmd) => self.handle_renew(cmd),
            CirculationCommand::ReturnLoan(cmd) => self.handle_return(cmd),
            CirculationCommand::PayFine(cmd) => self.handle_pay_fine(cmd),
            CirculationCommand::MarkOverdue(cmd) => self.handle_mark_overdue(cmd),
            CirculationCommand::PlaceReservation(cmd) => self.handle_place_reservation(cmd),
            CirculationCommand::CancelReservation(cmd) => self.handle_cancel_reservation(cmd),
        }
    }
}

impl LoanLifecycle {
    fn item_id(&self) -> ItemId {
        self.state.id_typed()
    }

    fn ensure_registered(&self) -> Result<(), CirculationError> {
        if !self.state.is_registered() {
            return Err(CirculationError::ItemNotRegistered {
                item_id: self.item_id(),
            });
        }
        Ok(())
    }

    fn ensure_new_loan_id(&self, loan_id: LoanId) -> Result<(), CirculationError> {
        if self.state.loan(loan_id).is_some() {
            return Err(CirculationError::LoanExists { loan_id });
        }
        Ok(())
    }

    fn find_loan(&self, loan_id: LoanId) -> Result<&Loan, CirculationError> {
        self.state
            .loan(loan_id)
            .ok_or(CirculationError::LoanNotFound { loan_id })
    }

    /// Borrower standing, due window, queue priority and stock, in that order.
    fn ensure_may_lend(
        &self,
        borrower: &BorrowerSnapshot,
        today: NaiveDate,
        due_date: NaiveDate,
    ) -> Result<(), CirculationError> {
        borrower.ensure_may_borrow()?;
        self.rules.loans.check_due_date(today, due_date)?;
        if self.state.queue().has_active_reservation() {
            return Err(CirculationError::ReservationPriority {
                item_id: self.item_id(),
            });
        }
        if !self.state.inventory().has_stock() {
            return Err(CirculationError::OutOfStock {
                item_id: self.item_id(),
            });
        }
        Ok(())
    }

    fn ensure_no_open_loan(&self, borrower: &BorrowerSnapshot) -> Result<(), CirculationError> {
        if let Some(open) = self.state.open_loan_for(borrower.borrower_id) {
            return Err(CirculationError::DuplicateLoan {
                borrower_id: borrower.borrower_id,
                item_id: self.item_id(),
                loan_id: open.id(),
            });
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Decision {
        if self.state.is_registered() {
            return Err(CirculationError::ItemAlreadyRegistered {
                item_id: cmd.item_id,
            });
        }
        Ok(vec![CirculationEvent::ItemRegistered(ItemRegistered {
            item_id: cmd.item_id,
            total_copies: cmd.total_copies,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseTotalCopies) -> Decision {
        self.ensure_registered()?;
        let resized = self
            .state
            .inventory()
            .resize(self.item_id(), cmd.total_copies)?;
        Ok(vec![CirculationEvent::TotalCopiesRevised(TotalCopiesRevised {
            item_id: cmd.item_id,
            total_copies: resized.total_copies(),
            available_copies: resized.available_copies(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_request(&self, cmd: &RequestLoan) -> Decision {
        self.ensure_registered()?;
        self.ensure_new_loan_id(cmd.loan_id)?;
        let today = cmd.occurred_at.date_naive();
        self.ensure_may_lend(&cmd.borrower, today, cmd.due_date)?;
        self.ensure_no_open_loan(&cmd.borrower)?;

        Ok(vec![CirculationEvent::LoanRequested(LoanRequested {
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            borrower_id: cmd.borrower.borrower_id,
            requested_on: today,
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveLoan) -> Decision {
        self.ensure_registered()?;
        let loan = self.find_loan(cmd.loan_id)?;
        if loan.status() != LoanStatus::Pending {
            return Err(CirculationError::invalid_state(
                format!("loan {}", loan.id()),
                loan.status(),
                "PENDING",
            ));
        }
        if cmd.borrower.borrower_id != loan.borrower_id() {
            return Err(CirculationError::invalid_state(
                format!("loan {}", loan.id()),
                format!("held by borrower {}", loan.borrower_id()),
                "the approving borrower",
            ));
        }

        let today = cmd.occurred_at.date_naive();
        self.ensure_may_lend(&cmd.borrower, today, loan.due_date())?;
        let shelf = self.state.inventory().decrement(self.item_id())?;

        Ok(vec![CirculationEvent::LoanApproved(LoanApproved {
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            borrowed_date: today,
            available_copies: shelf.available_copies(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_check_out(&self, cmd: &CheckOutLoan) -> Decision {
        self.ensure_registered()?;
        self.ensure_new_loan_id(cmd.loan_id)?;
        let today = cmd.occurred_at.date_naive();
        self.ensure_may_lend(&cmd.borrower, today, cmd.due_date)?;
        self.ensure_no_open_loan(&cmd.borrower)?;
        let shelf = self.state.inventory().decrement(self.item_id())?;

        Ok(vec![CirculationEvent::LoanCheckedOut(LoanCheckedOut {
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            borrower_id: cmd.borrower.borrower_id,
            borrowed_date: today,
            due_date: cmd.due_date,
            available_copies: shelf.available_copies(),
            reservation_id: None,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_check_out_reservation(&self, cmd: &CheckOutReservation) -> Decision {
        self.ensure_registered()?;
        self.ensure_new_loan_id(cmd.loan_id)?;
        let reservation = self.state.queue().ensure_active(cmd.reservation_id)?;
        if reservation.borrower_id != cmd.borrower.borrower_id {
            return Err(CirculationError::invalid_state(
                format!("reservation {}", reservation.id),
                format!("held by borrower {}", reservation.borrower_id),
                "the borrowing borrower",
            ));
        }
        let is_head = self
            .state
            .queue()
            .first_in_line()
            .is_some_and(|head| head.id == reservation.id);
        if !is_head {
            return Err(CirculationError::ReservationPriority {
                item_id: self.item_id(),
            });
        }

        let today = cmd.occurred_at.date_naive();
        cmd.borrower.ensure_may_borrow()?;
        self.rules.loans.check_due_date(today, cmd.due_date)?;
        self.ensure_no_open_loan(&cmd.borrower)?;
        let shelf = self.state.inventory().decrement(self.item_id())?;

        Ok(vec![
            CirculationEvent::ReservationFulfilled(ReservationFulfilled {
                item_id: cmd.item_id,
                reservation_id: cmd.reservation_id,
                loan_id: cmd.loan_id,
                occurred_at: cmd.occurred_at,
            }),
            CirculationEvent::LoanCheckedOut(LoanCheckedOut {
                item_id: cmd.item_id,
                loan_id: cmd.loan_id,
                borrower_id: cmd.borrower.borrower_id,
                borrowed_date: today,
                due_date: cmd.due_date,
                available_copies: shelf.available_copies(),
                reservation_id: Some(cmd.reservation_id),
                occurred_at: cmd.occurred_at,
            }),
        ])
    }

    fn handle_renew(&self, cmd: &RenewLoan) -> Decision {
        self.ensure_registered()?;
        let loan = self.find_loan(cmd.loan_id)?;
        if loan.status() != LoanStatus::Active {
            return Err(CirculationError::NotActive {
                loan_id: loan.id(),
                status: loan.status(),
            });
        }
        if let Some(return_date) = loan.return_date() {
            return Err(CirculationError::AlreadyReturned {
                loan_id: loan.id(),
                return_date,
            });
        }
        let today = cmd.occurred_at.date_naive();
        if today > loan.due_date() {
            return Err(CirculationError::AlreadyOverdue {
                loan_id: loan.id(),
                due_date: loan.due_date(),
            });
        }
        let policy = &self.rules.loans;
        if loan.renewal_count() >= policy.max_renewals {
            return Err(CirculationError::RenewalLimitReached {
                loan_id: loan.id(),
                limit: policy.max_renewals,
            });
        }

        // Scarce copies go to whoever is first in line, unless that is us.
        if self.state.inventory().available_copies() < policy.low_stock_threshold {
            if let Some(head) = self.state.queue().first_in_line() {
                if head.borrower_id != loan.borrower_id() {
                    return Err(CirculationError::ReservationPriority {
                        item_id: self.item_id(),
                    });
                }
            }
        }

        let due_date = policy.renewed_due_date(loan.due_date())?;
        Ok(vec![CirculationEvent::LoanRenewed(LoanRenewed {
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            due_date,
            renewal_count: loan.renewal_count() + 1,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnLoan) -> Decision {
        self.ensure_registered()?;
        let loan = self.find_loan(cmd.loan_id)?;
        if !matches!(loan.status(), LoanStatus::Active | LoanStatus::Overdue) {
            return Err(CirculationError::NotActive {
                loan_id: loan.id(),
                status: loan.status(),
            });
        }
        // A late return stays OVERDUE; its copy is already back on the shelf.
        if let Some(return_date) = loan.return_date() {
            return Err(CirculationError::AlreadyReturned {
                loan_id: loan.id(),
                return_date,
            });
        }

        let today = cmd.occurred_at.date_naive();
        let shelf = self.state.inventory().increment(self.item_id())?;
        let (status, fine_amount) = if today > loan.due_date() {
            (
                LoanStatus::Overdue,
                loan.accrued_fine(today, self.rules.fines.as_ref()),
            )
        } else {
            (LoanStatus::Returned, loan.fine_amount())
        };

        Ok(vec![CirculationEvent::LoanReturned(LoanReturned {
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            return_date: today,
            status,
            fine_amount,
            available_copies: shelf.available_copies(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pay_fine(&self, cmd: &PayFine) -> Decision {
        self.ensure_registered()?;
        let loan = self.find_loan(cmd.loan_id)?;
        if loan.fine_amount() == 0 {
            return Err(CirculationError::NoFineDue { loan_id: loan.id() });
        }
        Ok(vec![CirculationEvent::FinePaid(FinePaid {
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            amount: loan.fine_amount(),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Emits nothing when the loan is not past due or already reflects today's fine.
    fn handle_mark_overdue(&self, cmd: &MarkOverdue) -> Decision {
        self.ensure_registered()?;
        let loan = self.find_loan(cmd.loan_id)?;
        let today = cmd.occurred_at.date_naive();
        let fines = self.rules.fines.as_ref();
        if !loan.needs_overdue_sweep(today, fines) {
            return Ok(Vec::new());
        }

        Ok(vec![CirculationEvent::LoanMarkedOverdue(LoanMarkedOverdue {
            item_id: cmd.item_id,
            loan_id: cmd.loan_id,
            days_late: loan.days_late(today),
            fine_amount: loan.accrued_fine(today, fines),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_place_reservation(&self, cmd: &PlaceReservation) -> Decision {
        self.ensure_registered()?;
        cmd.borrower.ensure_may_reserve()?;
        let reservation = self.state.queue().enqueue(
            cmd.reservation_id,
            cmd.borrower.borrower_id,
            self.state.inventory().available_copies(),
            cmd.occurred_at.date_naive(),
        )?;

        Ok(vec![CirculationEvent::ReservationPlaced(ReservationPlaced {
            item_id: cmd.item_id,
            reservation_id: reservation.id,
            borrower_id: reservation.borrower_id,
            queue_position: reservation.queue_position,
            reserved_date: reservation.reserved_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel_reservation(&self, cmd: &CancelReservation) -> Decision {
        self.ensure_registered()?;
        self.state.queue().ensure_active(cmd.reservation_id)?;
        Ok(vec![CirculationEvent::ReservationCancelled(ReservationCancelled {
            item_id: cmd.item_id,
            reservation_id: cmd.reservation_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::borrower::BorrowerStanding;
    use crate::fine::DailyRateFine;
    use crate::policy::LoanPolicy;
    use crate::reservation::ReservationStatus;
    use chrono::{DateTime, Days, Utc};
    use proptest::prelude::*;
    use shelf_core::{AggregateId, BorrowerId, ReservationId};
    use shelf_events::execute;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(n)
    }

    fn at(date: NaiveDate) -> DateTime<Utc> {
        date.and_hms_opt(10, 0, 0).unwrap().and_utc()
    }

    fn test_item_id() -> ItemId {
        ItemId::new(AggregateId::new())
    }

    fn registered(copies: u32) -> LoanLifecycle {
        let item_id = test_item_id();
        let mut item = LoanLifecycle::empty(item_id, CirculationRules::default());
        execute(
            &mut item,
            &CirculationCommand::RegisterItem(RegisterItem {
                item_id,
                total_copies: copies,
                occurred_at: at(day(0)),
            }),
        )
        .unwrap();
        item
    }

    fn check_out(
        item: &mut LoanLifecycle,
        borrower: BorrowerId,
        on: NaiveDate,
        due: NaiveDate,
    ) -> Result<LoanId, CirculationError> {
        let loan_id = LoanId::new();
        let item_id = item.item_id();
        execute(
            item,
            &CirculationCommand::CheckOutLoan(CheckOutLoan {
                item_id,
                loan_id,
                borrower: BorrowerSnapshot::active(borrower),
                due_date: due,
                occurred_at: at(on),
            }),
        )?;
        Ok(loan_id)
    }

    fn return_loan(item: &mut LoanLifecycle, loan_id: LoanId, on: NaiveDate) -> Decision {
        let item_id = item.item_id();
        execute(
            item,
            &CirculationCommand::ReturnLoan(ReturnLoan {
                item_id,
                loan_id,
                occurred_at: at(on),
            }),
        )
    }

    fn renew(item: &mut LoanLifecycle, loan_id: LoanId, on: NaiveDate) -> Decision {
        let item_id = item.item_id();
        execute(
            item,
            &CirculationCommand::RenewLoan(RenewLoan {
                item_id,
                loan_id,
                occurred_at: at(on),
            }),
        )
    }

    fn reserve(item: &mut LoanLifecycle, borrower: BorrowerSnapshot, on: NaiveDate) -> Result<ReservationId, CirculationError> {
        let reservation_id = ReservationId::new();
        let item_id = item.item_id();
        execute(
            item,
            &CirculationCommand::PlaceReservation(PlaceReservation {
                item_id,
                reservation_id,
                borrower,
                occurred_at: at(on),
            }),
        )?;
        Ok(reservation_id)
    }

    fn mark_overdue(item: &mut LoanLifecycle, loan_id: LoanId, on: NaiveDate) -> Decision {
        let item_id = item.item_id();
        execute(
            item,
            &CirculationCommand::MarkOverdue(MarkOverdue {
                item_id,
                loan_id,
                occurred_at: at(on),
            }),
        )
    }

    #[test]
    fn commands_on_unregistered_item_are_rejected() {
        let item = LoanLifecycle::empty(test_item_id(), CirculationRules::default());
        let err = item
            .handle(&CirculationCommand::CheckOutLoan(CheckOutLoan {
                item_id: item.item_id(),
                loan_id: LoanId::new(),
                borrower: BorrowerSnapshot::active(BorrowerId::new()),
                due_date: day(2),
                occurred_at: at(day(0)),
            }))
            .unwrap_err();
        assert!(matches!(err, CirculationError::ItemNotRegistered { .. }));
    }

    #[test]
    fn check_out_takes_a_copy_and_bumps_version_per_event() {
        let mut item = registered(2);
        assert_eq!(item.version(), 1);

        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(3)).unwrap();

        assert_eq!(item.version(), 2);
        assert_eq!(item.state().inventory().available_copies(), 1);
        let loan = item.state().loan(loan_id).unwrap();
        assert_eq!(loan.status(), LoanStatus::Active);
        assert_eq!(loan.borrowed_date(), day(0));
    }

    #[test]
    fn draft_then_approve_decrements_only_on_approval() {
        let mut item = registered(1);
        let borrower = BorrowerSnapshot::active(BorrowerId::new());
        let loan_id = LoanId::new();
        let item_id = item.item_id();

        execute(
            &mut item,
            &CirculationCommand::RequestLoan(RequestLoan {
                item_id,
                loan_id,
                borrower,
                due_date: day(2),
                occurred_at: at(day(0)),
            }),
        )
        .unwrap();
        assert_eq!(item.state().inventory().available_copies(), 1);
        assert_eq!(item.state().loan(loan_id).unwrap().status(), LoanStatus::Pending);

        let approve = CirculationCommand::ApproveLoan(ApproveLoan {
            item_id,
            loan_id,
            borrower,
            occurred_at: at(day(1)),
        });
        execute(&mut item, &approve).unwrap();
        assert_eq!(item.state().inventory().available_copies(), 0);
        assert_eq!(item.state().loan(loan_id).unwrap().borrowed_date(), day(1));

        let err = item.handle(&approve).unwrap_err();
        assert!(matches!(err, CirculationError::InvalidState { .. }));
    }

    #[test]
    fn blocked_borrower_cannot_borrow() {
        let item = registered(1);
        let blocked = BorrowerSnapshot {
            borrower_id: BorrowerId::new(),
            standing: BorrowerStanding::Blocked,
            has_overdue_loans: false,
        };
        let err = item
            .handle(&CirculationCommand::CheckOutLoan(CheckOutLoan {
                item_id: item.item_id(),
                loan_id: LoanId::new(),
                borrower: blocked,
                due_date: day(2),
                occurred_at: at(day(0)),
            }))
            .unwrap_err();
        assert!(matches!(err, CirculationError::BorrowerBlocked { .. }));
    }

    #[test]
    fn due_date_outside_window_is_rejected() {
        let mut item = registered(1);
        let err = check_out(&mut item, BorrowerId::new(), day(2), day(1)).unwrap_err();
        assert!(matches!(err, CirculationError::InvalidDueDate { .. }));
        let err = check_out(&mut item, BorrowerId::new(), day(0), day(5)).unwrap_err();
        assert!(matches!(err, CirculationError::InvalidDueDate { .. }));
        assert_eq!(item.state().inventory().available_copies(), 1);
    }

    #[test]
    fn one_open_loan_per_borrower_per_item() {
        let mut item = registered(3);
        let borrower = BorrowerId::new();
        let first = check_out(&mut item, borrower, day(0), day(2)).unwrap();

        let err = check_out(&mut item, borrower, day(0), day(2)).unwrap_err();
        assert_eq!(
            err,
            CirculationError::DuplicateLoan {
                borrower_id: borrower,
                item_id: item.item_id(),
                loan_id: first,
            }
        );

        return_loan(&mut item, first, day(1)).unwrap();
        assert!(check_out(&mut item, borrower, day(1), day(3)).is_ok());
    }

    #[test]
    fn out_of_stock_leaves_state_unchanged() {
        let mut item = registered(1);
        check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();
        let before = item.state().clone();

        let err = check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap_err();
        assert!(matches!(err, CirculationError::OutOfStock { .. }));
        assert_eq!(item.state(), &before);
    }

    #[test]
    fn active_queue_blocks_new_loans_even_with_stock() {
        let mut item = registered(1);
        let holder = check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();
        reserve(&mut item, BorrowerSnapshot::active(BorrowerId::new()), day(0)).unwrap();
        return_loan(&mut item, holder, day(1)).unwrap();
        assert_eq!(item.state().inventory().available_copies(), 1);

        let err = check_out(&mut item, BorrowerId::new(), day(1), day(3)).unwrap_err();
        assert!(matches!(err, CirculationError::ReservationPriority { .. }));
    }

    #[test]
    fn queue_head_checks_out_its_reservation() {
        let mut item = registered(1);
        let holder = check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();
        let first = BorrowerSnapshot::active(BorrowerId::new());
        let second = BorrowerSnapshot::active(BorrowerId::new());
        let first_res = reserve(&mut item, first, day(0)).unwrap();
        let second_res = reserve(&mut item, second, day(0)).unwrap();
        return_loan(&mut item, holder, day(1)).unwrap();

        let checkout = |reservation_id, borrower: BorrowerSnapshot| {
            CirculationCommand::CheckOutReservation(CheckOutReservation {
                item_id: item.item_id(),
                reservation_id,
                loan_id: LoanId::new(),
                borrower,
                due_date: day(3),
                occurred_at: at(day(1)),
            })
        };

        let err = item.handle(&checkout(second_res, second)).unwrap_err();
        assert!(matches!(err, CirculationError::ReservationPriority { .. }));

        let cmd = checkout(first_res, first);
        let events = execute(&mut item, &cmd).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            item.state().reservation(first_res).unwrap().status,
            ReservationStatus::Fulfilled
        );
        assert_eq!(item.state().reservation(second_res).unwrap().queue_position, 1);
        assert_eq!(item.state().inventory().available_copies(), 0);
    }

    #[test]
    fn reservation_requires_empty_shelf_and_good_standing() {
        let mut item = registered(1);
        let err = reserve(&mut item, BorrowerSnapshot::active(BorrowerId::new()), day(0)).unwrap_err();
        assert!(matches!(err, CirculationError::ItemAvailable { .. }));

        check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();
        let overdue = BorrowerSnapshot {
            has_overdue_loans: true,
            ..BorrowerSnapshot::active(BorrowerId::new())
        };
        let err = reserve(&mut item, overdue, day(0)).unwrap_err();
        assert!(matches!(err, CirculationError::OutstandingOverdue { .. }));

        let borrower = BorrowerSnapshot::active(BorrowerId::new());
        reserve(&mut item, borrower, day(0)).unwrap();
        let err = reserve(&mut item, borrower, day(0)).unwrap_err();
        assert!(matches!(err, CirculationError::DuplicateReservation { .. }));
    }

    #[test]
    fn renewal_extends_due_date_until_limit() {
        let mut item = registered(5);
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(4)).unwrap();

        renew(&mut item, loan_id, day(3)).unwrap();
        assert_eq!(item.state().loan(loan_id).unwrap().due_date(), day(11));
        renew(&mut item, loan_id, day(4)).unwrap();
        assert_eq!(item.state().loan(loan_id).unwrap().renewal_count(), 2);

        let err = renew(&mut item, loan_id, day(5)).unwrap_err();
        assert!(matches!(err, CirculationError::RenewalLimitReached { limit: 2, .. }));
    }

    #[test]
    fn renewal_after_due_date_is_already_overdue() {
        let mut item = registered(5);
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();
        let err = renew(&mut item, loan_id, day(3)).unwrap_err();
        assert!(matches!(err, CirculationError::AlreadyOverdue { .. }));
    }

    #[test]
    fn renewal_yields_to_queue_head_when_stock_is_low() {
        let mut item = registered(1);
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(4)).unwrap();
        reserve(&mut item, BorrowerSnapshot::active(BorrowerId::new()), day(1)).unwrap();

        let err = renew(&mut item, loan_id, day(2)).unwrap_err();
        assert!(matches!(err, CirculationError::ReservationPriority { .. }));
        assert_eq!(item.state().loan(loan_id).unwrap().renewal_count(), 0);
    }

    #[test]
    fn on_time_return_restocks_without_fine() {
        let mut item = registered(1);
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(3)).unwrap();
        return_loan(&mut item, loan_id, day(3)).unwrap();

        let loan = item.state().loan(loan_id).unwrap();
        assert_eq!(loan.status(), LoanStatus::Returned);
        assert_eq!(loan.fine_amount(), 0);
        assert_eq!(loan.return_date(), Some(day(3)));
        assert_eq!(item.state().inventory().available_copies(), 1);

        let err = return_loan(&mut item, loan_id, day(4)).unwrap_err();
        assert!(matches!(
            err,
            CirculationError::NotActive { status: LoanStatus::Returned, .. }
        ));
        assert_eq!(item.state().inventory().available_copies(), 1);
    }

    #[test]
    fn late_return_is_fined_per_day() {
        let mut item = registered(1);
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(3)).unwrap();
        return_loan(&mut item, loan_id, day(6)).unwrap();

        let loan = item.state().loan(loan_id).unwrap();
        assert_eq!(loan.status(), LoanStatus::Overdue);
        assert_eq!(loan.fine_amount(), 300);
        assert!(!loan.is_open());

        let err = return_loan(&mut item, loan_id, day(7)).unwrap_err();
        assert!(matches!(err, CirculationError::AlreadyReturned { .. }));
        assert_eq!(item.state().inventory().available_copies(), 1);
    }

    #[test]
    fn returning_a_pending_loan_is_not_active() {
        let mut item = registered(1);
        let loan_id = LoanId::new();
        let item_id = item.item_id();
        execute(
            &mut item,
            &CirculationCommand::RequestLoan(RequestLoan {
                item_id,
                loan_id,
                borrower: BorrowerSnapshot::active(BorrowerId::new()),
                due_date: day(2),
                occurred_at: at(day(0)),
            }),
        )
        .unwrap();

        let err = return_loan(&mut item, loan_id, day(1)).unwrap_err();
        assert!(matches!(
            err,
            CirculationError::NotActive { status: LoanStatus::Pending, .. }
        ));
        assert_eq!(item.state().inventory().available_copies(), 1);
    }

    #[test]
    fn sweep_marks_overdue_and_is_idempotent() {
        let mut item = registered(1);
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();

        assert!(mark_overdue(&mut item, loan_id, day(2)).unwrap().is_empty());
        assert_eq!(item.loans_needing_sweep(day(4)), vec![loan_id]);

        let events = mark_overdue(&mut item, loan_id, day(4)).unwrap();
        assert_eq!(events.len(), 1);
        let loan = item.state().loan(loan_id).unwrap();
        assert_eq!((loan.status(), loan.fine_amount()), (LoanStatus::Overdue, 200));

        assert!(mark_overdue(&mut item, loan_id, day(4)).unwrap().is_empty());
        assert!(item.loans_needing_sweep(day(4)).is_empty());

        mark_overdue(&mut item, loan_id, day(5)).unwrap();
        assert_eq!(item.state().loan(loan_id).unwrap().fine_amount(), 300);
    }

    #[test]
    fn paying_clears_fine_until_the_next_assessment() {
        let mut item = registered(1);
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();
        mark_overdue(&mut item, loan_id, day(4)).unwrap();

        let pay = CirculationCommand::PayFine(PayFine {
            item_id: item.item_id(),
            loan_id,
            occurred_at: at(day(4)),
        });
        execute(&mut item, &pay).unwrap();
        assert_eq!(item.state().loan(loan_id).unwrap().fine_amount(), 0);
        assert!(matches!(
            item.handle(&pay).unwrap_err(),
            CirculationError::NoFineDue { .. }
        ));

        return_loan(&mut item, loan_id, day(5)).unwrap();
        let loan = item.state().loan(loan_id).unwrap();
        assert_eq!(loan.fine_amount(), 300);
        assert_eq!(loan.fines_paid(), 200);
    }

    #[test]
    fn shrinking_below_copies_on_loan_is_rejected() {
        let mut item = registered(2);
        check_out(&mut item, BorrowerId::new(), day(0), day(2)).unwrap();
        let revise = |total| {
            CirculationCommand::ReviseTotalCopies(ReviseTotalCopies {
                item_id: item.item_id(),
                total_copies: total,
                occurred_at: at(day(1)),
            })
        };
        assert!(matches!(
            item.handle(&revise(0)).unwrap_err(),
            CirculationError::InvalidCopyCount { .. }
        ));
        let cmd = revise(4);
        execute(&mut item, &cmd).unwrap();
        assert_eq!(item.state().inventory().available_copies(), 3);
    }

    #[test]
    fn custom_fine_policy_is_used() {
        let item_id = test_item_id();
        let rules = CirculationRules::new(LoanPolicy::default(), DailyRateFine::new(25).with_cap(60));
        let mut item = LoanLifecycle::empty(item_id, rules);
        execute(
            &mut item,
            &CirculationCommand::RegisterItem(RegisterItem {
                item_id,
                total_copies: 1,
                occurred_at: at(day(0)),
            }),
        )
        .unwrap();
        let loan_id = check_out(&mut item, BorrowerId::new(), day(0), day(1)).unwrap();
        return_loan(&mut item, loan_id, day(10)).unwrap();
        assert_eq!(item.state().loan(loan_id).unwrap().fine_amount(), 60);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn copies_on_loan_match_checked_out_loans(ops in proptest::collection::vec(0u8..4, 0..40)) {
            let mut item = registered(3);
            let borrowers: Vec<BorrowerId> = (0..4).map(|_| BorrowerId::new()).collect();
            let mut today = day(0);

            for (idx, op) in ops.into_iter().enumerate() {
                let borrower = borrowers[idx % borrowers.len()];
                match op {
                    0 => { let _ = check_out(&mut item, borrower, today, today + Days::new(2)); }
                    1 => {
                        if let Some(open) = item.state().open_loan_for(borrower).map(Loan::id) {
                            let _ = return_loan(&mut item, open, today);
                        }
                    }
                    2 => { let _ = reserve(&mut item, BorrowerSnapshot::active(borrower), today); }
                    _ => { today = today + Days::new(1); }
                }

                let state = item.state();
                let checked_out = state.loans().iter().filter(|l| l.is_checked_out()).count() as u32;
                prop_assert_eq!(state.inventory().on_loan(), checked_out);
                prop_assert!(state.inventory().available_copies() <= state.inventory().total_copies());
                prop_assert!(state.queue().is_contiguous());
            }
        }
    }
}
