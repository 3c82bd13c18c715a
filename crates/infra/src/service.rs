//! Circulation service: the facade callers use.
//!
//! Every write is one command against one item stream, dispatched through the
//! compare-and-swap loop in [`CommandDispatcher`]. Reads are served from the
//! [`CirculationProjection`], caught up from the store first, and any loan
//! they touch that has slipped past its due date is marked overdue before it
//! is returned.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use shelf_circulation::{
    AGGREGATE_TYPE, ApproveLoan, BorrowerSnapshot, BorrowerStanding, CancelReservation,
    CheckOutLoan, CheckOutReservation, CirculationCommand, CirculationError, CirculationRules,
    ItemCirculation, ItemId, InventoryCounter, Loan, LoanLifecycle, MarkOverdue, PayFine,
    PlaceReservation, RegisterItem, RenewLoan, RequestLoan, Reservation, ReturnLoan,
    ReviseTotalCopies,
};
use shelf_core::{AggregateId, BorrowerId, Clock, LoanId, ReservationId};
use shelf_events::{EventBus, EventEnvelope};

use crate::borrowers::BorrowerDirectory;
use crate::command_dispatcher::CommandDispatcher;
use crate::config::CirculationConfig;
use crate::error::ServiceError;
use crate::event_store::EventStore;
use crate::projections::CirculationProjection;
use crate::read_model::InMemoryReadModelStore;
use crate::report::CirculationSummary;

type ItemReplicas = InMemoryReadModelStore<ItemId, ItemCirculation>;

/// Outcome of one overdue sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub items_scanned: usize,
    /// Loans whose status or fine changed in this pass.
    pub loans_marked: usize,
}

pub struct CirculationService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    projection: CirculationProjection<ItemReplicas>,
    borrowers: Arc<dyn BorrowerDirectory>,
    clock: Arc<dyn Clock>,
    rules: CirculationRules,
}

impl<S, B> core::fmt::Debug for CirculationService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CirculationService")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl<S, B> CirculationService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        store: S,
        bus: B,
        borrowers: Arc<dyn BorrowerDirectory>,
        clock: Arc<dyn Clock>,
        config: &CirculationConfig,
    ) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus)
                .with_max_attempts(config.max_dispatch_attempts),
            projection: CirculationProjection::new(ItemReplicas::new()),
            borrowers,
            clock,
            rules: config.rules(),
        }
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub fn bus(&self) -> &B {
        self.dispatcher.bus()
    }

    pub fn rules(&self) -> &CirculationRules {
        &self.rules
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Catalog feed
    // ─────────────────────────────────────────────────────────────────────

    pub fn register_item(&self, item_id: ItemId, total_copies: u32) -> Result<ItemCirculation, ServiceError> {
        self.execute(CirculationCommand::RegisterItem(RegisterItem {
            item_id,
            total_copies,
            occurred_at: self.clock.now(),
        }))
    }

    pub fn revise_total_copies(&self, item_id: ItemId, total_copies: u32) -> Result<InventoryCounter, ServiceError> {
        let item = self.execute(CirculationCommand::ReviseTotalCopies(ReviseTotalCopies {
            item_id,
            total_copies,
            occurred_at: self.clock.now(),
        }))?;
        Ok(item.inventory())
    }

    /// Current circulation state of one item.
    pub fn item(&self, item_id: ItemId) -> Result<ItemCirculation, ServiceError> {
        self.sweep_item(item_id).map(|(item, _)| item)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loans
    // ─────────────────────────────────────────────────────────────────────

    /// Open a PENDING loan; no copy leaves the shelf until approval.
    pub fn create_draft(
        &self,
        borrower_id: BorrowerId,
        item_id: ItemId,
        due_date: NaiveDate,
    ) -> Result<Loan, ServiceError> {
        let loan_id = LoanId::new();
        let item = self.execute(CirculationCommand::RequestLoan(RequestLoan {
            item_id,
            loan_id,
            borrower: self.borrower(borrower_id)?,
            due_date,
            occurred_at: self.clock.now(),
        }))?;
        loan_in(&item, loan_id)
    }

    /// Open an ACTIVE loan and take a copy in one step.
    pub fn create_direct(
        &self,
        borrower_id: BorrowerId,
        item_id: ItemId,
        due_date: NaiveDate,
    ) -> Result<Loan, ServiceError> {
        let loan_id = LoanId::new();
        let item = self.execute(CirculationCommand::CheckOutLoan(CheckOutLoan {
            item_id,
            loan_id,
            borrower: self.borrower(borrower_id)?,
            due_date,
            occurred_at: self.clock.now(),
        }))?;
        loan_in(&item, loan_id)
    }

    pub fn approve(&self, loan_id: LoanId) -> Result<Loan, ServiceError> {
        let current = self.current_loan(loan_id)?;
        let item = self.execute(CirculationCommand::ApproveLoan(ApproveLoan {
            item_id: current.item_id(),
            loan_id,
            borrower: self.borrower(current.borrower_id())?,
            occurred_at: self.clock.now(),
        }))?;
        loan_in(&item, loan_id)
    }

    pub fn return_item(&self, loan_id: LoanId) -> Result<Loan, ServiceError> {
        let item_id = self.locate_loan(loan_id)?;
        let item = self.execute(CirculationCommand::ReturnLoan(ReturnLoan {
            item_id,
            loan_id,
            occurred_at: self.clock.now(),
        }))?;
        loan_in(&item, loan_id)
    }

    pub fn renew(&self, loan_id: LoanId) -> Result<Loan, ServiceError> {
        let item_id = self.locate_loan(loan_id)?;
        let item = self.execute(CirculationCommand::RenewLoan(RenewLoan {
            item_id,
            loan_id,
            occurred_at: self.clock.now(),
        }))?;
        loan_in(&item, loan_id)
    }

    /// Settle the fine assessed on a loan.
    ///
    /// The loan is swept first, so a fine accrued since the last read is the
    /// one being paid.
    pub fn pay_fine(&self, loan_id: LoanId) -> Result<Loan, ServiceError> {
        let item_id = self.locate_loan(loan_id)?;
        self.sweep_item(item_id)?;
        let item = self.execute(CirculationCommand::PayFine(PayFine {
            item_id,
            loan_id,
            occurred_at: self.clock.now(),
        }))?;
        loan_in(&item, loan_id)
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Result<Loan, ServiceError> {
        let item_id = self.locate_loan(loan_id)?;
        let (item, _) = self.sweep_item(item_id)?;
        loan_in(&item, loan_id)
    }

    /// Every loan, grouped by item.
    pub fn list_loans(&self) -> Result<Vec<Loan>, ServiceError> {
        Ok(self
            .swept_items()?
            .iter()
            .flat_map(|item| item.loans().iter().cloned())
            .collect())
    }

    pub fn list_loans_by_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Loan>, ServiceError> {
        Ok(self
            .swept_items()?
            .iter()
            .flat_map(|item| item.loans_of(borrower_id).cloned().collect::<Vec<_>>())
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reservations
    // ─────────────────────────────────────────────────────────────────────

    pub fn create_reservation(&self, borrower_id: BorrowerId, item_id: ItemId) -> Result<Reservation, ServiceError> {
        let reservation_id = ReservationId::new();
        let item = self.execute(CirculationCommand::PlaceReservation(PlaceReservation {
            item_id,
            reservation_id,
            borrower: self.borrower(borrower_id)?,
            occurred_at: self.clock.now(),
        }))?;
        reservation_in(&item, reservation_id)
    }

    pub fn cancel_reservation(&self, reservation_id: ReservationId) -> Result<Reservation, ServiceError> {
        let item_id = self.locate_reservation(reservation_id)?;
        let item = self.execute(CirculationCommand::CancelReservation(CancelReservation {
            item_id,
            reservation_id,
            occurred_at: self.clock.now(),
        }))?;
        reservation_in(&item, reservation_id)
    }

    /// The holder of the queue head takes a copy; the reservation is fulfilled.
    pub fn checkout_reservation(&self, reservation_id: ReservationId, due_date: NaiveDate) -> Result<Loan, ServiceError> {
        let item_id = self.locate_reservation(reservation_id)?;
        self.projection.catch_up(self.store(), item_id)?;
        let reservation = self
            .projection
            .item(&item_id)
            .and_then(|item| item.reservation(reservation_id).cloned())
            .ok_or(CirculationError::ReservationNotFound { reservation_id })?;

        let loan_id = LoanId::new();
        let item = self.execute(CirculationCommand::CheckOutReservation(CheckOutReservation {
            item_id,
            reservation_id,
            loan_id,
            borrower: self.borrower(reservation.borrower_id)?,
            due_date,
            occurred_at: self.clock.now(),
        }))?;
        loan_in(&item, loan_id)
    }

    pub fn get_reservation(&self, reservation_id: ReservationId) -> Result<Reservation, ServiceError> {
        let item_id = self.locate_reservation(reservation_id)?;
        self.projection.catch_up(self.store(), item_id)?;
        let item = self
            .projection
            .item(&item_id)
            .ok_or(CirculationError::ItemNotRegistered { item_id })?;
        reservation_in(&item, reservation_id)
    }

    pub fn list_reservations(&self) -> Result<Vec<Reservation>, ServiceError> {
        Ok(self
            .current_items()?
            .iter()
            .flat_map(|item| item.queue().all().iter().cloned())
            .collect())
    }

    pub fn list_reservations_by_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Reservation>, ServiceError> {
        Ok(self
            .current_items()?
            .iter()
            .flat_map(|item| item.queue().all().iter())
            .filter(|r| r.borrower_id == borrower_id)
            .cloned()
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Mark every loan past its due date overdue and bring its fine up to today.
    pub fn sweep_overdue(&self) -> Result<SweepReport, ServiceError> {
        let mut report = SweepReport::default();
        for item_id in self.store().stream_ids(AGGREGATE_TYPE)? {
            let (_, marked) = self.sweep_item(ItemId::new(item_id))?;
            report.items_scanned += 1;
            report.loans_marked += marked;
        }
        if report.loans_marked > 0 {
            info!(
                items_scanned = report.items_scanned,
                loans_marked = report.loans_marked,
                "overdue sweep completed"
            );
        }
        Ok(report)
    }

    pub fn summary(&self) -> Result<CirculationSummary, ServiceError> {
        Ok(CirculationSummary::from_items(&self.swept_items()?))
    }

    /// Drop the read model and replay it from the store.
    pub fn rebuild_read_model(&self) -> Result<(), ServiceError> {
        self.projection.rebuild(self.store())?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn execute(&self, command: CirculationCommand) -> Result<ItemCirculation, ServiceError> {
        self.execute_counted(command).map(|(item, _)| item)
    }

    /// Dispatch one command; also returns how many events it committed.
    fn execute_counted(&self, command: CirculationCommand) -> Result<(ItemCirculation, usize), ServiceError> {
        let operation = command.name();
        let item_id = command.item_id();

        let dispatched = self
            .dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, &command, |id: AggregateId| {
                LoanLifecycle::empty(ItemId::new(id), self.rules.clone())
            })
            .map_err(ServiceError::from)
            .inspect_err(|err| log_failure(operation, item_id, err))?;

        let committed = dispatched.committed.len();
        if committed > 0 {
            debug!(
                operation,
                item_id = %item_id,
                events = committed,
                version = dispatched.aggregate.state().version(),
                "circulation command committed"
            );
            // The commit stands even if the replica lags; the next read retries.
            if let Err(err) = self.projection.catch_up(self.store(), item_id) {
                warn!(operation, item_id = %item_id, error = %err, "read model catch-up failed");
            }
        }

        Ok((dispatched.aggregate.into_state(), committed))
    }

    /// Catch up one item, mark its past-due loans, and return the result.
    fn sweep_item(&self, item_id: ItemId) -> Result<(ItemCirculation, usize), ServiceError> {
        self.projection.catch_up(self.store(), item_id)?;
        let mut item = self
            .projection
            .item(&item_id)
            .ok_or(CirculationError::ItemNotRegistered { item_id })?;

        let today = self.clock.today();
        let due: Vec<LoanId> = item
            .loans()
            .iter()
            .filter(|loan| loan.needs_overdue_sweep(today, self.rules.fines.as_ref()))
            .map(Loan::id)
            .collect();

        let mut marked = 0;
        for loan_id in due {
            let (next, committed) = self.execute_counted(CirculationCommand::MarkOverdue(MarkOverdue {
                item_id,
                loan_id,
                occurred_at: self.clock.now(),
            }))?;
            item = next;
            // A concurrent sweep may have got there first.
            if committed > 0 {
                marked += 1;
                debug!(loan_id = %loan_id, item_id = %item_id, "loan marked overdue");
            }
        }
        Ok((item, marked))
    }

    fn swept_items(&self) -> Result<Vec<ItemCirculation>, ServiceError> {
        self.store()
            .stream_ids(AGGREGATE_TYPE)?
            .into_iter()
            .map(|id| self.sweep_item(ItemId::new(id)).map(|(item, _)| item))
            .collect()
    }

    fn current_items(&self) -> Result<Vec<ItemCirculation>, ServiceError> {
        self.catch_up_all()?;
        Ok(self.projection.items())
    }

    /// Pick up streams written by other service instances.
    fn catch_up_all(&self) -> Result<(), ServiceError> {
        for id in self.store().stream_ids(AGGREGATE_TYPE)? {
            self.projection.catch_up(self.store(), ItemId::new(id))?;
        }
        Ok(())
    }

    fn current_loan(&self, loan_id: LoanId) -> Result<Loan, ServiceError> {
        let item_id = self.locate_loan(loan_id)?;
        self.projection.catch_up(self.store(), item_id)?;
        self.projection
            .item(&item_id)
            .and_then(|item| item.loan(loan_id).cloned())
            .ok_or_else(|| CirculationError::LoanNotFound { loan_id }.into())
    }

    fn locate_loan(&self, loan_id: LoanId) -> Result<ItemId, ServiceError> {
        if let Some(item_id) = self.projection.item_of_loan(loan_id) {
            return Ok(item_id);
        }
        self.catch_up_all()?;
        self.projection
            .item_of_loan(loan_id)
            .ok_or_else(|| CirculationError::LoanNotFound { loan_id }.into())
    }

    fn locate_reservation(&self, reservation_id: ReservationId) -> Result<ItemId, ServiceError> {
        if let Some(item_id) = self.projection.item_of_reservation(reservation_id) {
            return Ok(item_id);
        }
        self.catch_up_all()?;
        self.projection
            .item_of_reservation(reservation_id)
            .ok_or_else(|| CirculationError::ReservationNotFound { reservation_id }.into())
    }

    /// Standing from the account system, overdue status from our own loans.
    ///
    /// Every stream is caught up first so loans committed by other instances
    /// sharing the store are counted.
    fn borrower(&self, borrower_id: BorrowerId) -> Result<BorrowerSnapshot, ServiceError> {
        let standing: BorrowerStanding = self
            .borrowers
            .standing(borrower_id)
            .ok_or(ServiceError::BorrowerNotFound(borrower_id))?;
        self.catch_up_all()?;
        let today = self.clock.today();
        let has_overdue_loans = self
            .projection
            .items()
            .iter()
            .any(|item| item.loans_of(borrower_id).any(|loan| loan.is_past_due(today)));

        Ok(BorrowerSnapshot {
            borrower_id,
            standing,
            has_overdue_loans,
        })
    }
}

fn loan_in(item: &ItemCirculation, loan_id: LoanId) -> Result<Loan, ServiceError> {
    item.loan(loan_id)
        .cloned()
        .ok_or_else(|| CirculationError::LoanNotFound { loan_id }.into())
}

fn reservation_in(item: &ItemCirculation, reservation_id: ReservationId) -> Result<Reservation, ServiceError> {
    item.reservation(reservation_id)
        .cloned()
        .ok_or_else(|| CirculationError::ReservationNotFound { reservation_id }.into())
}

fn log_failure(operation: &'static str, item_id: ItemId, err: &ServiceError) {
    if err.is_consistency() {
        error!(
            operation,
            item_id = %item_id,
            error_class = "consistency",
            error = %err,
            "circulation invariant violated"
        );
    } else if let Some(class) = err.class() {
        info!(
            operation,
            item_id = %item_id,
            error_class = ?class,
            error = %err,
            "circulation command rejected"
        );
    } else {
        warn!(operation, item_id = %item_id, error = %err, "circulation command failed");
    }
}
