//! Borrower facts consulted by circulation rules.
//!
//! Accounts are owned elsewhere; commands carry a snapshot taken when the
//! command was built.

use serde::{Deserialize, Serialize};

use shelf_core::BorrowerId;

use crate::error::CirculationError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BorrowerStanding {
    Active,
    Blocked,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowerSnapshot {
    pub borrower_id: BorrowerId,
    pub standing: BorrowerStanding,
    /// Whether the borrower holds any OVERDUE loan on any item.
    pub has_overdue_loans: bool,
}

impl BorrowerSnapshot {
    pub fn active(borrower_id: BorrowerId) -> Self {
        Self {
            borrower_id,
            standing: BorrowerStanding::Active,
            has_overdue_loans: false,
        }
    }

    pub fn ensure_may_borrow(&self) -> Result<(), CirculationError> {
        if self.standing == BorrowerStanding::Blocked {
            return Err(CirculationError::BorrowerBlocked {
                borrower_id: self.borrower_id,
            });
        }
        Ok(())
    }

    pub fn ensure_may_reserve(&self) -> Result<(), CirculationError> {
        self.ensure_may_borrow()?;
        if self.has_overdue_loans {
            return Err(CirculationError::OutstandingOverdue {
                borrower_id: self.borrower_id,
            });
        }
        Ok(())
    }
}
