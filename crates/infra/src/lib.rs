//! Infrastructure layer: event storage, command dispatch, read models and the
//! circulation service built on them.

pub mod borrowers;
pub mod command_dispatcher;
pub mod config;
pub mod error;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod report;
pub mod service;
pub mod workers;

pub use borrowers::{BorrowerDirectory, InMemoryBorrowerDirectory};
pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::CirculationConfig;
pub use error::ServiceError;
pub use report::CirculationSummary;
pub use service::{CirculationService, SweepReport};
pub use workers::{OverdueSweepWorker, WorkerHandle};
