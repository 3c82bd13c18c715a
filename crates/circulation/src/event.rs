//! Facts recorded on an item's circulation stream.
//!
//! Events carry the figures decided at command time (due dates, fines, the
//! resulting shelf count) so replay never re-runs policy.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shelf_core::{BorrowerId, LoanId, ReservationId};
use shelf_events::Event;

use crate::item::ItemId;
use crate::loan::LoanStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub item_id: ItemId,
    pub total_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalCopiesRevised {
    pub item_id: ItemId,
    pub total_copies: u32,
    pub available_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

/// A loan drafted in PENDING; no copy leaves the shelf yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequested {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub borrower_id: BorrowerId,
    pub requested_on: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanApproved {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub borrowed_date: NaiveDate,
    pub available_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

/// A loan created directly in ACTIVE, optionally fulfilling a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanCheckedOut {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub borrower_id: BorrowerId,
    pub borrowed_date: NaiveDate,
    pub due_date: NaiveDate,
    pub available_copies: u32,
    pub reservation_id: Option<ReservationId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRenewed {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub due_date: NaiveDate,
    pub renewal_count: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanReturned {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub return_date: NaiveDate,
    /// RETURNED, or OVERDUE for a late return.
    pub status: LoanStatus,
    pub fine_amount: u64,
    pub available_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanMarkedOverdue {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub days_late: i64,
    pub fine_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinePaid {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPlaced {
    pub item_id: ItemId,
    pub reservation_id: ReservationId,
    pub borrower_id: BorrowerId,
    pub queue_position: u32,
    pub reserved_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCancelled {
    pub item_id: ItemId,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFulfilled {
    pub item_id: ItemId,
    pub reservation_id: ReservationId,
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CirculationEvent {
    ItemRegistered(ItemRegistered),
    TotalCopiesRevised(TotalCopiesRevised),
    LoanRequested(LoanRequested),
    LoanApproved(LoanApproved),
    LoanCheckedOut(LoanCheckedOut),
    LoanRenewed(LoanRenewed),
    LoanReturned(LoanReturned),
    LoanMarkedOverdue(LoanMarkedOverdue),
    FinePaid(FinePaid),
    ReservationPlaced(ReservationPlaced),
    ReservationCancelled(ReservationCancelled),
    ReservationFulfilled(ReservationFulfilled),
}

impl CirculationEvent {
    pub fn item_id(&self) -> ItemId {
        match self {
            CirculationEvent::ItemRegistered(e) => e.item_id,
            CirculationEvent::TotalCopiesRevised(e) => e.item_id,
            CirculationEvent::LoanRequested(e) => e.item_id,
            CirculationEvent::LoanApproved(e) => e.item_id,
            CirculationEvent::LoanCheckedOut(e) => e.item_id,
            CirculationEvent::LoanRenewed(e) => e.item_id,
            CirculationEvent::LoanReturned(e) => e.item_id,
            CirculationEvent::LoanMarkedOverdue(e) => e.item_id,
            CirculationEvent::FinePaid(e) => e.item_id,
            CirculationEvent::ReservationPlaced(e) => e.item_id,
            CirculationEvent::ReservationCancelled(e) => e.item_id,
            CirculationEvent::ReservationFulfilled(e) => e.item_id,
        }
    }
}

impl Event for CirculationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CirculationEvent::ItemRegistered(_) => "circulation.item.registered",
            CirculationEvent::TotalCopiesRevised(_) => "circulation.item.copies_revised",
            CirculationEvent::LoanRequested(_) => "circulation.loan.requested",
            CirculationEvent::LoanApproved(_) => "circulation.loan.approved",
            CirculationEvent::LoanCheckedOut(_) => "circulation.loan.checked_out",
            CirculationEvent::LoanRenewed(_) => "circulation.loan.renewed",
            CirculationEvent::LoanReturned(_) => "circulation.loan.returned",
            CirculationEvent::LoanMarkedOverdue(_) => "circulation.loan.marked_overdue",
            CirculationEvent::FinePaid(_) => "circulation.loan.fine_paid",
            CirculationEvent::ReservationPlaced(_) => "circulation.reservation.placed",
            CirculationEvent::ReservationCancelled(_) => "circulation.reservation.cancelled",
            CirculationEvent::ReservationFulfilled(_) => "circulation.reservation.fulfilled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CirculationEvent::ItemRegistered(e) => e.occurred_at,
            CirculationEvent::TotalCopiesRevised(e) => e.occurred_at,
            CirculationEvent::LoanRequested(e) => e.occurred_at,
            CirculationEvent::LoanApproved(e) => e.occurred_at,
            CirculationEvent::LoanCheckedOut(e) => e.occurred_at,
            CirculationEvent::LoanRenewed(e) => e.occurred_at,
            CirculationEvent::LoanReturned(e) => e.occurred_at,
            CirculationEvent::LoanMarkedOverdue(e) => e.occurred_at,
            CirculationEvent::FinePaid(e) => e.occurred_at,
            CirculationEvent::ReservationPlaced(e) => e.occurred_at,
            CirculationEvent::ReservationCancelled(e) => e.occurred_at,
            CirculationEvent::ReservationFulfilled(e) => e.occurred_at,
        }
    }
}
