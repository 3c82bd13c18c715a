//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream
//!   ↓
//! 2. Rehydrate (apply history to rebuild state)
//!   ↓
//! 3. Handle (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   │   └─ version conflict → back to 1 (bounded retries)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! Step 4 is a compare-and-swap on the stream version. Every command that
//! touches an aggregate is therefore serialized per stream: a writer that
//! decided on stale state loses the append, reloads, and decides again
//! against the winner's events. Nothing is written for a rejected command.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use shelf_core::{Aggregate, AggregateId, ExpectedVersion};
use shelf_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Default bound on load → decide → append attempts per command.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The aggregate rejected the command.
    #[error("{0}")]
    Rejected(E),

    /// Every attempt lost the optimistic concurrency race.
    #[error("gave up after {attempts} concurrent modification attempts")]
    ConcurrencyExhausted { attempts: u32 },

    /// The loaded stream is not a gapless sequence for the requested aggregate.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// A stored payload no longer deserializes into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (events are persisted).
    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Outcome of a successful dispatch.
#[derive(Debug)]
pub struct Dispatched<A> {
    /// The aggregate with the committed events applied.
    pub aggregate: A,
    /// Committed events; empty when the command was a no-op.
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_attempts: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load the current state of an aggregate without deciding anything.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id).map_err(DispatchError::Store)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command through the full pipeline, retrying on version
    /// conflicts up to the configured number of attempts.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: shelf_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut aggregate = self.load(aggregate_id, &make_aggregate)?;
            let expected = ExpectedVersion::Exact(aggregate.version());

            let decided = aggregate.handle(command).map_err(DispatchError::Rejected)?;
            if decided.is_empty() {
                return Ok(Dispatched {
                    aggregate,
                    committed: vec![],
                });
            }

            let uncommitted = decided
                .iter()
                .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
                .collect::<Result<Vec<_>, _>>()
                .map_err(DispatchError::Store)?;

            match self.store.append(uncommitted, expected) {
                Ok(committed) => {
                    for ev in &decided {
                        aggregate.apply(ev);
                    }
                    for stored in &committed {
                        self.bus
                            .publish(stored.to_envelope())
                            .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
                    }
                    return Ok(Dispatched { aggregate, committed });
                }
                Err(EventStoreError::Concurrency(reason)) if attempt < self.max_attempts => {
                    debug!(
                        aggregate_id = %aggregate_id,
                        attempt,
                        %reason,
                        "stream moved during dispatch, retrying"
                    );
                }
                Err(EventStoreError::Concurrency(reason)) => {
                    warn!(
                        aggregate_id = %aggregate_id,
                        attempts = attempt,
                        %reason,
                        "giving up after repeated concurrent modifications"
                    );
                    return Err(DispatchError::ConcurrencyExhausted { attempts: attempt });
                }
                Err(other) => return Err(DispatchError::Store(other)),
            }
        }
    }
}

fn validate_loaded_stream<E>(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError<E>> {
    // A buggy backend must not be able to feed another stream or a gapped
    // history into the decision.
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        let expected = idx as u64 + 1;
        if e.sequence_number != expected {
            return Err(DispatchError::CorruptStream(format!(
                "expected sequence_number {expected}, found {}",
                e.sequence_number
            )));
        }
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError<A::Error>>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use shelf_circulation::{
        AGGREGATE_TYPE, CirculationCommand, CirculationError, CirculationRules, ItemId,
        LoanLifecycle, RegisterItem,
    };
    use shelf_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;

    type TestDispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn setup() -> TestDispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn register(item_id: ItemId) -> CirculationCommand {
        CirculationCommand::RegisterItem(RegisterItem {
            item_id,
            total_copies: 1,
            occurred_at: Utc::now(),
        })
    }

    fn make(id: AggregateId) -> LoanLifecycle {
        LoanLifecycle::empty(ItemId::new(id), CirculationRules::default())
    }

    #[test]
    fn dispatch_persists_and_publishes() {
        let dispatcher = setup();
        let sub = dispatcher.bus().subscribe();
        let item_id = ItemId::new(AggregateId::new());

        let out = dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, &register(item_id), make)
            .unwrap();

        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.aggregate.state().inventory().total_copies(), 1);
        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.sequence_number(), 1);
        assert_eq!(envelope.aggregate_type(), AGGREGATE_TYPE);
    }

    #[test]
    fn rejection_writes_nothing() {
        let dispatcher = setup();
        let item_id = ItemId::new(AggregateId::new());
        dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, &register(item_id), make)
            .unwrap();

        let err = dispatcher
            .dispatch(item_id.0, AGGREGATE_TYPE, &register(item_id), make)
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Rejected(CirculationError::ItemAlreadyRegistered { .. })
        ));
        assert_eq!(dispatcher.store().load_stream(item_id.0).unwrap().len(), 1);
    }

    #[test]
    fn gapped_history_is_reported_as_corrupt() {
        let stream = vec![StoredEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: AggregateId::new(),
            aggregate_type: AGGREGATE_TYPE.to_string(),
            sequence_number: 2,
            event_type: "x".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: JsonValue::Null,
        }];
        let err = validate_loaded_stream::<()>(stream[0].aggregate_id, &stream).unwrap_err();
        assert!(matches!(err, DispatchError::CorruptStream(_)));
    }
}
