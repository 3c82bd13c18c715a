//! Per-item circulation state rebuilt from the item's event stream.

use serde::{Deserialize, Serialize};

use shelf_core::{AggregateId, BorrowerId, LoanId};

use crate::event::CirculationEvent;
use crate::inventory::InventoryCounter;
use crate::loan::{Loan, LoanStatus};
use crate::reservation::{Reservation, ReservationQueue, ReservationStatus};

/// Catalog item identifier; also the id of the item's event stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub AggregateId);

impl ItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Copy counter, reservation queue and loans of one item.
///
/// Pure state: `apply` folds recorded events and never fails. Decisions live
/// in [`crate::LoanLifecycle`]; read-model replicas fold the same events
/// through this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCirculation {
    id: ItemId,
    registered: bool,
    inventory: InventoryCounter,
    queue: ReservationQueue,
    loans: Vec<Loan>,
    version: u64,
}

impl ItemCirculation {
    /// Create an empty, not-yet-registered instance for rehydration.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            registered: false,
            inventory: InventoryCounter::default(),
            queue: ReservationQueue::new(id),
            loans: Vec::new(),
            version: 0,
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn inventory(&self) -> InventoryCounter {
        self.inventory
    }

    pub fn queue(&self) -> &ReservationQueue {
        &self.queue
    }

    /// Loans in the order they were created.
    pub fn loans(&self) -> &[Loan] {
        &self.loans
    }

    pub fn loan(&self, loan_id: LoanId) -> Option<&Loan> {
        self.loans.iter().find(|l| l.id == loan_id)
    }

    pub fn reservation(&self, reservation_id: shelf_core::ReservationId) -> Option<&Reservation> {
        self.queue.get(reservation_id)
    }

    pub fn open_loan_for(&self, borrower_id: BorrowerId) -> Option<&Loan> {
        self.loans
            .iter()
            .find(|l| l.borrower_id == borrower_id && l.is_open())
    }

    pub fn loans_of(&self, borrower_id: BorrowerId) -> impl Iterator<Item = &Loan> {
        self.loans.iter().filter(move |l| l.borrower_id == borrower_id)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn apply(&mut self, event: &CirculationEvent) {
        match event {
            CirculationEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.registered = true;
                self.inventory = InventoryCounter::new(e.total_copies);
            }
            CirculationEvent::TotalCopiesRevised(e) => {
                self.inventory = InventoryCounter::restore(e.total_copies, e.available_copies);
            }
            CirculationEvent::LoanRequested(e) => {
                self.loans.push(Loan {
                    id: e.loan_id,
                    borrower_id: e.borrower_id,
                    item_id: e.item_id,
                    status: LoanStatus::Pending,
                    renewal_count: 0,
                    fine_amount: 0,
                    fines_paid: 0,
                    borrowed_date: e.requested_on,
                    due_date: e.due_date,
                    return_date: None,
                });
            }
            CirculationEvent::LoanApproved(e) => {
                if let Some(loan) = self.loan_mut(e.loan_id) {
                    loan.status = LoanStatus::Active;
                    loan.borrowed_date = e.borrowed_date;
                }
                self.settle_shelf(e.available_copies);
            }
            CirculationEvent::LoanCheckedOut(e) => {
                self.loans.push(Loan {
                    id: e.loan_id,
                    borrower_id: e.borrower_id,
                    item_id: e.item_id,
                    status: LoanStatus::Active,
                    renewal_count: 0,
                    fine_amount: 0,
                    fines_paid: 0,
                    borrowed_date: e.borrowed_date,
                    due_date: e.due_date,
                    return_date: None,
                });
                self.settle_shelf(e.available_copies);
            }
            CirculationEvent::LoanRenewed(e) => {
                if let Some(loan) = self.loan_mut(e.loan_id) {
                    loan.due_date = e.due_date;
                    loan.renewal_count = e.renewal_count;
                }
            }
            CirculationEvent::LoanReturned(e) => {
                if let Some(loan) = self.loan_mut(e.loan_id) {
                    loan.status = e.status;
                    loan.return_date = Some(e.return_date);
                    loan.fine_amount = e.fine_amount;
                }
                self.settle_shelf(e.available_copies);
            }
            CirculationEvent::LoanMarkedOverdue(e) => {
                if let Some(loan) = self.loan_mut(e.loan_id) {
                    loan.status = LoanStatus::Overdue;
                    loan.fine_amount = e.fine_amount;
                }
            }
            CirculationEvent::FinePaid(e) => {
                if let Some(loan) = self.loan_mut(e.loan_id) {
                    loan.fines_paid = loan.fines_paid.saturating_add(e.amount);
                    loan.fine_amount = 0;
                }
            }
            CirculationEvent::ReservationPlaced(e) => {
                self.queue.push(Reservation {
                    id: e.reservation_id,
                    borrower_id: e.borrower_id,
                    item_id: e.item_id,
                    queue_position: e.queue_position,
                    status: ReservationStatus::Active,
                    reserved_date: e.reserved_date,
                });
            }
            CirculationEvent::ReservationCancelled(e) => {
                self.queue.close(e.reservation_id, ReservationStatus::Cancelled);
            }
            CirculationEvent::ReservationFulfilled(e) => {
                self.queue.close(e.reservation_id, ReservationStatus::Fulfilled);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn loan_mut(&mut self, loan_id: LoanId) -> Option<&mut Loan> {
        self.loans.iter_mut().find(|l| l.id == loan_id)
    }

    fn settle_shelf(&mut self, available_copies: u32) {
        self.inventory = InventoryCounter::restore(self.inventory.total_copies(), available_copies);
    }
}
