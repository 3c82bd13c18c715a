//! Intents accepted by the circulation aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shelf_core::{AggregateId, LoanId, ReservationId};
use shelf_events::Command;

use crate::borrower::BorrowerSnapshot;
use crate::item::ItemId;

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: ItemId,
    pub total_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseTotalCopies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseTotalCopies {
    pub item_id: ItemId,
    pub total_copies: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RequestLoan (draft in PENDING).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLoan {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub borrower: BorrowerSnapshot,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveLoan {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub borrower: BorrowerSnapshot,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CheckOutLoan (direct to ACTIVE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutLoan {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub borrower: BorrowerSnapshot,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CheckOutReservation (head of the queue takes the copy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutReservation {
    pub item_id: ItemId,
    pub reservation_id: ReservationId,
    pub loan_id: LoanId,
    pub borrower: BorrowerSnapshot,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenewLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewLoan {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLoan {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PayFine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayFine {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOverdue (overdue sweep for one loan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOverdue {
    pub item_id: ItemId,
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PlaceReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceReservation {
    pub item_id: ItemId,
    pub reservation_id: ReservationId,
    pub borrower: BorrowerSnapshot,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservation {
    pub item_id: ItemId,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CirculationCommand {
    RegisterItem(RegisterItem),
    ReviseTotalCopies(ReviseTotalCopies),
    RequestLoan(RequestLoan),
    ApproveLoan(ApproveLoan),
    CheckOutLoan(CheckOutLoan),
    CheckOutReservation(CheckOutReservation),
    RenewLoan(RenewLoan),
    ReturnLoan(ReturnLoan),
    PayFine(PayFine),
    MarkOverdue(MarkOverdue),
    PlaceReservation(PlaceReservation),
    CancelReservation(CancelReservation),
}

impl CirculationCommand {
    pub fn item_id(&self) -> ItemId {
        match self {
            CirculationCommand::RegisterItem(c) => c.item_id,
            CirculationCommand::ReviseTotalCopies(c) => c.item_id,
            CirculationCommand::RequestLoan(c) => c.item_id,
            CirculationCommand::ApproveLoan(c) => c.item_id,
            CirculationCommand::CheckOutLoan(c) => c.item_id,
            CirculationCommand::CheckOutReservation(c) => c.item_id,
            CirculationCommand::RenewLoan(c) => c.item_id,
            CirculationCommand::ReturnLoan(c) => c.item_id,
            CirculationCommand::PayFine(c) => c.item_id,
            CirculationCommand::MarkOverdue(c) => c.item_id,
            CirculationCommand::PlaceReservation(c) => c.item_id,
            CirculationCommand::CancelReservation(c) => c.item_id,
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CirculationCommand::RegisterItem(_) => "register_item",
            CirculationCommand::ReviseTotalCopies(_) => "revise_total_copies",
            CirculationCommand::RequestLoan(_) => "request_loan",
            CirculationCommand::ApproveLoan(_) => "approve_loan",
            CirculationCommand::CheckOutLoan(_) => "check_out_loan",
            CirculationCommand::CheckOutReservation(_) => "check_out_reservation",
            CirculationCommand::RenewLoan(_) => "renew_loan",
            CirculationCommand::ReturnLoan(_) => "return_loan",
            CirculationCommand::PayFine(_) => "pay_fine",
            CirculationCommand::MarkOverdue(_) => "mark_overdue",
            CirculationCommand::PlaceReservation(_) => "place_reservation",
            CirculationCommand::CancelReservation(_) => "cancel_reservation",
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CirculationCommand::RegisterItem(c) => c.occurred_at,
            CirculationCommand::ReviseTotalCopies(c) => c.occurred_at,
            CirculationCommand::RequestLoan(c) => c.occurred_at,
            CirculationCommand::ApproveLoan(c) => c.occurred_at,
            CirculationCommand::CheckOutLoan(c) => c.occurred_at,
            CirculationCommand::CheckOutReservation(c) => c.occurred_at,
            CirculationCommand::RenewLoan(c) => c.occurred_at,
            CirculationCommand::ReturnLoan(c) => c.occurred_at,
            CirculationCommand::PayFine(c) => c.occurred_at,
            CirculationCommand::MarkOverdue(c) => c.occurred_at,
            CirculationCommand::PlaceReservation(c) => c.occurred_at,
            CirculationCommand::CancelReservation(c) => c.occurred_at,
        }
    }
}

impl Command for CirculationCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.item_id().0
    }
}
