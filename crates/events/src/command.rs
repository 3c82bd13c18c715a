use shelf_core::AggregateId;

/// A command targets a specific aggregate (command abstraction).
///
/// Commands represent **intent** ("approve this loan"). They are transient and
/// are turned into events (facts) when accepted, or rejected with a
/// rule-specific error.
///
/// Each command operates on exactly one aggregate stream, which is the unit of
/// atomicity: everything a command changes is committed together or not at
/// all. Routing uses `target_aggregate_id()`.
///
/// Commands must be cloneable (they are re-decided on optimistic concurrency
/// retries) and own their data so they can cross worker threads.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
