use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use shelf_circulation::{AGGREGATE_TYPE, CirculationEvent, ItemCirculation, ItemId};
use shelf_core::{AggregateId, LoanId, ReservationId};
use shelf_events::{Delivery, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::ReadModelStore;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize circulation event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection state lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// Per-item circulation replica.
///
/// Folds each item's stream into an [`ItemCirculation`] with the same `apply`
/// the aggregate uses, and indexes loan and reservation ids back to their
/// item so callers can address them without knowing the item.
///
/// Delivery may be at-least-once: envelopes at or below the stream cursor are
/// ignored, and a gap is an error rather than a silent skip.
#[derive(Debug)]
pub struct CirculationProjection<S>
where
    S: ReadModelStore<ItemId, ItemCirculation>,
{
    items: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
    loans: RwLock<HashMap<LoanId, ItemId>>,
    reservations: RwLock<HashMap<ReservationId, ItemId>>,
}

impl<S> CirculationProjection<S>
where
    S: ReadModelStore<ItemId, ItemCirculation>,
{
    pub fn new(items: S) -> Self {
        Self {
            items,
            cursors: RwLock::new(HashMap::new()),
            loans: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
        }
    }

    pub fn item(&self, item_id: &ItemId) -> Option<ItemCirculation> {
        self.items.get(item_id).filter(ItemCirculation::is_registered)
    }

    pub fn items(&self) -> Vec<ItemCirculation> {
        self.items
            .list()
            .into_iter()
            .filter(ItemCirculation::is_registered)
            .collect()
    }

    pub fn item_of_loan(&self, loan_id: LoanId) -> Option<ItemId> {
        self.loans.read().ok()?.get(&loan_id).copied()
    }

    pub fn item_of_reservation(&self, reservation_id: ReservationId) -> Option<ItemId> {
        self.reservations.read().ok()?.get(&reservation_id).copied()
    }

    /// Last applied sequence number of an item's stream.
    pub fn cursor(&self, item_id: ItemId) -> u64 {
        self.cursors
            .read()
            .ok()
            .and_then(|c| c.get(&item_id.0).copied())
            .unwrap_or(0)
    }

    /// Apply a published envelope.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // The cursor lock serializes replica updates for every stream.
        let mut cursors = self.cursors.write().map_err(|_| ProjectionError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        match envelope.delivery(last) {
            Delivery::Redelivered => return Ok(()),
            Delivery::Gap { .. } => {
                return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
            }
            Delivery::Next => {}
        }

        let event: CirculationEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let item_id = event.item_id();
        if item_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event item_id does not match envelope aggregate_id".to_string(),
            ));
        }

        self.index(&event, item_id);

        let mut replica = self
            .items
            .get(&item_id)
            .unwrap_or_else(|| ItemCirculation::empty(item_id));
        replica.apply(&event);
        self.items.upsert(item_id, replica);

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Bring one item's replica up to date with the store.
    ///
    /// Safe to call concurrently: each caller reads a contiguous tail past the
    /// cursor it observed, and already-applied envelopes are skipped.
    pub fn catch_up<E>(&self, store: &E, item_id: ItemId) -> Result<usize, ProjectionError>
    where
        E: EventStore + ?Sized,
    {
        let tail = store.load_stream_after(item_id.0, self.cursor(item_id))?;
        for stored in &tail {
            self.apply_envelope(&stored.to_envelope())?;
        }
        if !tail.is_empty() {
            debug!(item_id = %item_id, applied = tail.len(), "circulation replica caught up");
        }
        Ok(tail.len())
    }

    /// Discard every replica and replay all item streams from the store.
    pub fn rebuild<E>(&self, store: &E) -> Result<(), ProjectionError>
    where
        E: EventStore + ?Sized,
    {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
            self.items.clear();
        }
        if let Ok(mut loans) = self.loans.write() {
            loans.clear();
        }
        if let Ok(mut reservations) = self.reservations.write() {
            reservations.clear();
        }

        for aggregate_id in store.stream_ids(AGGREGATE_TYPE)? {
            self.catch_up(store, ItemId::new(aggregate_id))?;
        }
        Ok(())
    }

    fn index(&self, event: &CirculationEvent, item_id: ItemId) {
        match event {
            CirculationEvent::LoanRequested(e) => self.index_loan(e.loan_id, item_id),
            CirculationEvent::LoanCheckedOut(e) => self.index_loan(e.loan_id, item_id),
            CirculationEvent::ReservationPlaced(e) => {
                if let Ok(mut reservations) = self.reservations.write() {
                    reservations.insert(e.reservation_id, item_id);
                }
            }
            _ => {}
        }
    }

    fn index_loan(&self, loan_id: LoanId, item_id: ItemId) {
        if let Ok(mut loans) = self.loans.write() {
            loans.insert(loan_id, item_id);
        }
    }
}
