//! Per-item copy counter.

use serde::{Deserialize, Serialize};

use crate::error::CirculationError;
use crate::item::ItemId;

/// Tracks how many physical copies of an item exist and how many are on the
/// shelf.
///
/// Always holds `0 <= available_copies <= total_copies`. The counter is a
/// value: operations return the next counter and never mutate in place, so a
/// rejected decision leaves the committed state untouched.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCounter {
    total_copies: u32,
    available_copies: u32,
}

impl InventoryCounter {
    /// A freshly registered item with every copy on the shelf.
    pub fn new(total_copies: u32) -> Self {
        Self {
            total_copies,
            available_copies: total_copies,
        }
    }

    /// Rebuild a counter from recorded figures, clamping `available` to `total`.
    pub(crate) fn restore(total_copies: u32, available_copies: u32) -> Self {
        Self {
            total_copies,
            available_copies: available_copies.min(total_copies),
        }
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn available_copies(&self) -> u32 {
        self.available_copies
    }

    pub fn on_loan(&self) -> u32 {
        self.total_copies - self.available_copies
    }

    pub fn has_stock(&self) -> bool {
        self.available_copies > 0
    }

    /// Take one copy off the shelf.
    pub(crate) fn decrement(self, item_id: ItemId) -> Result<Self, CirculationError> {
        if self.available_copies == 0 {
            return Err(CirculationError::OutOfStock { item_id });
        }
        Ok(Self {
            available_copies: self.available_copies - 1,
            ..self
        })
    }

    /// Put one copy back on the shelf.
    pub(crate) fn increment(self, item_id: ItemId) -> Result<Self, CirculationError> {
        if self.available_copies >= self.total_copies {
            return Err(CirculationError::InventoryOverflow {
                item_id,
                total_copies: self.total_copies,
            });
        }
        Ok(Self {
            available_copies: self.available_copies + 1,
            ..self
        })
    }

    /// Change the number of copies owned; copies on loan stay on loan.
    pub(crate) fn resize(self, item_id: ItemId, total_copies: u32) -> Result<Self, CirculationError> {
        let on_loan = self.on_loan();
        if total_copies < on_loan {
            return Err(CirculationError::InvalidCopyCount {
                item_id,
                requested: total_copies,
                on_loan,
            });
        }
        Ok(Self {
            total_copies,
            available_copies: total_copies - on_loan,
        })
    }
}
