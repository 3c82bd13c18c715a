//! Circulation rule violations.

use chrono::NaiveDate;
use thiserror::Error;

use shelf_core::{BorrowerId, LoanId, ReservationId};

use crate::item::ItemId;
use crate::loan::LoanStatus;

/// Coarse classification of a [`CirculationError`].
///
/// Callers branch on this instead of matching every variant: validation
/// failures are ordinary business rejections, consistency failures mean an
/// internal invariant would have been broken.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Consistency,
    NotFound,
    Conflict,
}

/// Every rule a circulation command can violate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CirculationError {
    #[error("item {item_id} is not registered")]
    ItemNotRegistered { item_id: ItemId },

    #[error("item {item_id} is already registered")]
    ItemAlreadyRegistered { item_id: ItemId },

    #[error("loan {loan_id} not found")]
    LoanNotFound { loan_id: LoanId },

    #[error("loan {loan_id} already exists")]
    LoanExists { loan_id: LoanId },

    #[error("reservation {reservation_id} not found")]
    ReservationNotFound { reservation_id: ReservationId },

    #[error("reservation {reservation_id} already exists")]
    ReservationExists { reservation_id: ReservationId },

    #[error("borrower {borrower_id} is blocked")]
    BorrowerBlocked { borrower_id: BorrowerId },

    #[error("borrower {borrower_id} has overdue loans outstanding")]
    OutstandingOverdue { borrower_id: BorrowerId },

    #[error("due date {due_date} must fall between {earliest} and {latest}")]
    InvalidDueDate {
        due_date: NaiveDate,
        earliest: NaiveDate,
        latest: NaiveDate,
    },

    #[error("item {item_id} has a reservation queue that takes priority")]
    ReservationPriority { item_id: ItemId },

    #[error("no copies of item {item_id} are available")]
    OutOfStock { item_id: ItemId },

    #[error("item {item_id} cannot hold more than {total_copies} copies")]
    InventoryOverflow { item_id: ItemId, total_copies: u32 },

    #[error("item {item_id} has {on_loan} copies on loan; cannot shrink to {requested}")]
    InvalidCopyCount {
        item_id: ItemId,
        requested: u32,
        on_loan: u32,
    },

    #[error("item {item_id} has {available_copies} copies available; borrow it instead")]
    ItemAvailable {
        item_id: ItemId,
        available_copies: u32,
    },

    #[error("borrower {borrower_id} already has an open loan {loan_id} on item {item_id}")]
    DuplicateLoan {
        borrower_id: BorrowerId,
        item_id: ItemId,
        loan_id: LoanId,
    },

    #[error("borrower {borrower_id} already holds a reservation on item {item_id}")]
    DuplicateReservation {
        borrower_id: BorrowerId,
        item_id: ItemId,
    },

    #[error("queue position {position} on item {item_id} is already taken")]
    QueuePositionCollision { item_id: ItemId, position: u32 },

    #[error("{subject} is {status}, expected {expected}")]
    InvalidState {
        subject: String,
        status: String,
        expected: &'static str,
    },

    #[error("loan {loan_id} is {status}, not ACTIVE")]
    NotActive { loan_id: LoanId, status: LoanStatus },

    #[error("loan {loan_id} was already returned on {return_date}")]
    AlreadyReturned {
        loan_id: LoanId,
        return_date: NaiveDate,
    },

    #[error("loan {loan_id} was due on {due_date}")]
    AlreadyOverdue { loan_id: LoanId, due_date: NaiveDate },

    #[error("loan {loan_id} reached the renewal limit of {limit}")]
    RenewalLimitReached { loan_id: LoanId, limit: u32 },

    #[error("loan {loan_id} has no fine due")]
    NoFineDue { loan_id: LoanId },
}

impl CirculationError {
    pub fn class(&self) -> ErrorClass {
        use CirculationError::*;
        match self {
            ItemNotRegistered { .. } | LoanNotFound { .. } | ReservationNotFound { .. } => {
                ErrorClass::NotFound
            }
            ItemAlreadyRegistered { .. } | LoanExists { .. } | ReservationExists { .. } => {
                ErrorClass::Conflict
            }
            InventoryOverflow { .. } | QueuePositionCollision { .. } => ErrorClass::Consistency,
            _ => ErrorClass::Validation,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.class() == ErrorClass::Validation
    }

    pub fn is_consistency(&self) -> bool {
        self.class() == ErrorClass::Consistency
    }

    pub(crate) fn invalid_state(
        subject: impl Into<String>,
        status: impl ToString,
        expected: &'static str,
    ) -> Self {
        Self::InvalidState {
            subject: subject.into(),
            status: status.to_string(),
            expected,
        }
    }
}
