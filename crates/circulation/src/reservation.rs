//! FIFO reservation queue for an item with no copies on the shelf.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use shelf_core::{BorrowerId, ReservationId};

use crate::error::CirculationError;
use crate::item::ItemId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    Active,
    Cancelled,
    Fulfilled,
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Fulfilled => "FULFILLED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub borrower_id: BorrowerId,
    pub item_id: ItemId,
    /// 1-based place in line. Closed reservations keep their last position.
    pub queue_position: u32,
    pub status: ReservationStatus,
    pub reserved_date: NaiveDate,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// All reservations ever placed on one item.
///
/// Active entries always occupy positions `1..=n` with no gaps: closing a
/// reservation moves everyone behind it up by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationQueue {
    item_id: ItemId,
    entries: Vec<Reservation>,
}

impl ReservationQueue {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            entries: Vec::new(),
        }
    }

    pub fn get(&self, reservation_id: ReservationId) -> Option<&Reservation> {
        self.entries.iter().find(|r| r.id == reservation_id)
    }

    /// Every reservation, including closed ones, in placement order.
    pub fn all(&self) -> &[Reservation] {
        &self.entries
    }

    /// Active reservations ordered by queue position.
    pub fn active(&self) -> Vec<&Reservation> {
        let mut active: Vec<&Reservation> = self.entries.iter().filter(|r| r.is_active()).collect();
        active.sort_by_key(|r| r.queue_position);
        active
    }

    pub fn active_count(&self) -> u32 {
        self.entries.iter().filter(|r| r.is_active()).count() as u32
    }

    pub fn has_active_reservation(&self) -> bool {
        self.entries.iter().any(Reservation::is_active)
    }

    pub fn first_in_line(&self) -> Option<&Reservation> {
        self.entries
            .iter()
            .filter(|r| r.is_active())
            .min_by_key(|r| r.queue_position)
    }

    pub fn holds_active(&self, borrower_id: BorrowerId) -> bool {
        self.entries
            .iter()
            .any(|r| r.is_active() && r.borrower_id == borrower_id)
    }

    /// Active positions are exactly `1..=active_count()`.
    pub fn is_contiguous(&self) -> bool {
        self.active()
            .iter()
            .enumerate()
            .all(|(idx, r)| r.queue_position == idx as u32 + 1)
    }

    /// Decide a new reservation at the back of the line.
    pub(crate) fn enqueue(
        &self,
        reservation_id: ReservationId,
        borrower_id: BorrowerId,
        available_copies: u32,
        reserved_date: NaiveDate,
    ) -> Result<Reservation, CirculationError> {
        if self.get(reservation_id).is_some() {
            return Err(CirculationError::ReservationExists { reservation_id });
        }
        if available_copies > 0 {
            return Err(CirculationError::ItemAvailable {
                item_id: self.item_id,
                available_copies,
            });
        }
        if self.holds_active(borrower_id) {
            return Err(CirculationError::DuplicateReservation {
                borrower_id,
                item_id: self.item_id,
            });
        }

        let position = self.active_count() + 1;
        if self
            .entries
            .iter()
            .any(|r| r.is_active() && r.queue_position == position)
        {
            return Err(CirculationError::QueuePositionCollision {
                item_id: self.item_id,
                position,
            });
        }

        Ok(Reservation {
            id: reservation_id,
            borrower_id,
            item_id: self.item_id,
            queue_position: position,
            status: ReservationStatus::Active,
            reserved_date,
        })
    }

    /// Look up a reservation that can still be cancelled or fulfilled.
    pub(crate) fn ensure_active(&self, reservation_id: ReservationId) -> Result<&Reservation, CirculationError> {
        let reservation = self
            .get(reservation_id)
            .ok_or(CirculationError::ReservationNotFound { reservation_id })?;
        if !reservation.is_active() {
            return Err(CirculationError::invalid_state(
                format!("reservation {reservation_id}"),
                reservation.status,
                "ACTIVE",
            ));
        }
        Ok(reservation)
    }

    pub(crate) fn push(&mut self, reservation: Reservation) {
        self.entries.push(reservation);
    }

    /// Close an active reservation and close the gap it leaves.
    pub(crate) fn close(&mut self, reservation_id: ReservationId, status: ReservationStatus) {
        let Some(closed) = self
            .entries
            .iter_mut()
            .find(|r| r.id == reservation_id && r.is_active())
        else {
            return;
        };
        closed.status = status;
        let vacated = closed.queue_position;

        for r in self.entries.iter_mut() {
            if r.is_active() && r.queue_position > vacated {
                r.queue_position -= 1;
            }
        }
    }
}
