//! Errors surfaced by the circulation service.

use thiserror::Error;

use shelf_circulation::{CirculationError, ErrorClass};
use shelf_core::BorrowerId;

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStoreError;
use crate::projections::ProjectionError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Circulation(#[from] CirculationError),

    #[error("borrower not found: {0}")]
    BorrowerNotFound(BorrowerId),

    #[error("gave up after {attempts} concurrent modification attempts")]
    ConcurrencyExhausted { attempts: u32 },

    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    #[error("event publication failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

impl ServiceError {
    /// Class of a domain rejection, if this is one.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            ServiceError::Circulation(e) => Some(e.class()),
            ServiceError::BorrowerNotFound(_) => Some(ErrorClass::NotFound),
            _ => None,
        }
    }

    /// Rejected by a business rule; never worth retrying.
    pub fn is_validation(&self) -> bool {
        self.class() == Some(ErrorClass::Validation)
    }

    /// State that should be impossible was observed.
    pub fn is_consistency(&self) -> bool {
        matches!(self.class(), Some(ErrorClass::Consistency))
            || matches!(self, ServiceError::CorruptStream(_))
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == Some(ErrorClass::NotFound)
    }
}

impl From<DispatchError<CirculationError>> for ServiceError {
    fn from(err: DispatchError<CirculationError>) -> Self {
        match err {
            DispatchError::Rejected(e) => ServiceError::Circulation(e),
            DispatchError::ConcurrencyExhausted { attempts } => {
                ServiceError::ConcurrencyExhausted { attempts }
            }
            DispatchError::CorruptStream(msg) => ServiceError::CorruptStream(msg),
            DispatchError::Deserialize(msg) => ServiceError::CorruptStream(msg),
            DispatchError::Store(e) => ServiceError::Store(e),
            DispatchError::Publish(msg) => ServiceError::Publish(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_circulation::ItemId;
    use shelf_core::AggregateId;

    #[test]
    fn classes_follow_the_domain_error() {
        let item_id = ItemId::new(AggregateId::new());

        let overflow: ServiceError = DispatchError::Rejected(CirculationError::InventoryOverflow {
            item_id,
            total_copies: 1,
        })
        .into();
        assert!(overflow.is_consistency());
        assert!(!overflow.is_validation());

        let out_of_stock: ServiceError =
            DispatchError::Rejected(CirculationError::OutOfStock { item_id }).into();
        assert!(out_of_stock.is_validation());

        let exhausted: ServiceError =
            DispatchError::<CirculationError>::ConcurrencyExhausted { attempts: 3 }.into();
        assert_eq!(exhausted.class(), None);
    }
}
