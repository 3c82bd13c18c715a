use chrono::{DateTime, Utc};

/// A fact recorded in an item's circulation stream.
///
/// Stored payloads are replayed to rebuild state, so a change to an event's
/// shape needs a new `version` rather than an edit in place.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name stored next to the payload, e.g. `circulation.loan.approved`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time of the fact. Its UTC date is the circulation day.
    fn occurred_at(&self) -> DateTime<Utc>;
}
