//! Projection implementations (read model builders).
//!
//! Projections fold committed events into query-optimized read models. They
//! are rebuildable from the event store and idempotent under at-least-once
//! delivery.

pub mod circulation;

pub use circulation::{CirculationProjection, ProjectionError};
