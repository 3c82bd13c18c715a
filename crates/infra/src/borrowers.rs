//! Borrower standing lookup.
//!
//! Accounts live outside the circulation engine; the service only needs to
//! know whether a borrower exists and whether they are blocked.

use std::collections::HashMap;
use std::sync::RwLock;

use shelf_circulation::BorrowerStanding;
use shelf_core::BorrowerId;

/// Port to the account system.
pub trait BorrowerDirectory: Send + Sync {
    /// `None` when the borrower is unknown.
    fn standing(&self, borrower_id: BorrowerId) -> Option<BorrowerStanding>;
}

impl<D> BorrowerDirectory for std::sync::Arc<D>
where
    D: BorrowerDirectory + ?Sized,
{
    fn standing(&self, borrower_id: BorrowerId) -> Option<BorrowerStanding> {
        (**self).standing(borrower_id)
    }
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBorrowerDirectory {
    inner: RwLock<HashMap<BorrowerId, BorrowerStanding>>,
}

impl InMemoryBorrowerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a borrower in good standing.
    pub fn register(&self, borrower_id: BorrowerId) {
        self.set_standing(borrower_id, BorrowerStanding::Active);
    }

    pub fn set_standing(&self, borrower_id: BorrowerId, standing: BorrowerStanding) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(borrower_id, standing);
        }
    }
}

impl BorrowerDirectory for InMemoryBorrowerDirectory {
    fn standing(&self, borrower_id: BorrowerId) -> Option<BorrowerStanding> {
        self.inner.read().ok()?.get(&borrower_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_borrowers_have_no_standing() {
        let directory = InMemoryBorrowerDirectory::new();
        let known = BorrowerId::new();
        directory.register(known);
        directory.set_standing(known, BorrowerStanding::Blocked);

        assert_eq!(directory.standing(known), Some(BorrowerStanding::Blocked));
        assert_eq!(directory.standing(BorrowerId::new()), None);
    }
}
