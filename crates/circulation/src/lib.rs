//! Circulation domain module (event-sourced).
//!
//! Business rules for lending physical items: the per-item inventory counter,
//! the reservation queue, the fine policy and the loan state machine that
//! orchestrates them. Implemented purely as deterministic domain logic (no IO,
//! no storage, no clock).
//!
//! Every item owns one aggregate stream (`LoanLifecycle`) holding its counter,
//! its queue and all of its loans, so every rule that spans them is decided
//! and committed atomically per item.

pub mod borrower;
pub mod command;
pub mod error;
pub mod event;
pub mod fine;
pub mod inventory;
pub mod item;
pub mod lifecycle;
pub mod loan;
pub mod policy;
pub mod reservation;

pub use borrower::{BorrowerSnapshot, BorrowerStanding};
pub use command::{
    ApproveLoan, CancelReservation, CheckOutLoan, CheckOutReservation, CirculationCommand,
    MarkOverdue, PayFine, PlaceReservation, RegisterItem, RenewLoan, RequestLoan, ReturnLoan,
    ReviseTotalCopies,
};
pub use error::{CirculationError, ErrorClass};
pub use event::{
    CirculationEvent, FinePaid, ItemRegistered, LoanApproved, LoanCheckedOut, LoanMarkedOverdue,
    LoanRenewed, LoanRequested, LoanReturned, ReservationCancelled, ReservationFulfilled,
    ReservationPlaced, TotalCopiesRevised,
};
pub use fine::{DailyRateFine, FineCalculator};
pub use inventory::InventoryCounter;
pub use item::{ItemCirculation, ItemId};
pub use lifecycle::{AGGREGATE_TYPE, LoanLifecycle};
pub use loan::{Loan, LoanStatus};
pub use policy::{CirculationRules, LoanPolicy};
pub use reservation::{Reservation, ReservationQueue, ReservationStatus};
