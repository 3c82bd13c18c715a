use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shelf_core::AggregateId;

/// How an envelope relates to a consumer's position in its stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Already applied; drop it.
    Redelivered,
    /// The event right after the cursor.
    Next,
    /// Events between the cursor and this one are missing.
    Gap { expected: u64 },
}

/// A committed event as seen by replicas and bus subscribers.
///
/// `sequence_number` is the event's position in its stream, starting at 1.
/// Consumers keep a cursor per stream and use [`EventEnvelope::delivery`] to
/// drop redeliveries and detect gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,
    event_type: String,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Routing name, readable without decoding the payload.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn delivery(&self, cursor: u64) -> Delivery {
        let expected = cursor + 1;
        if self.sequence_number < expected {
            Delivery::Redelivered
        } else if self.sequence_number == expected {
            Delivery::Next
        } else {
            Delivery::Gap { expected }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seq: u64) -> EventEnvelope<()> {
        EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::new(),
            "circulation.item",
            seq,
            "circulation.loan.returned",
            (),
        )
    }

    #[test]
    fn delivery_is_judged_against_the_cursor() {
        assert_eq!(at(1).delivery(0), Delivery::Next);
        assert_eq!(at(3).delivery(3), Delivery::Redelivered);
        assert_eq!(at(2).delivery(3), Delivery::Redelivered);
        assert_eq!(at(4).delivery(3), Delivery::Next);
        assert_eq!(at(6).delivery(3), Delivery::Gap { expected: 4 });
    }
}
