//! `shelf-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the aggregate contract, the shared domain error and the clock
//! abstraction used to decide what "today" is.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::DomainError;
pub use id::{AggregateId, BorrowerId, LoanId, ReservationId};
