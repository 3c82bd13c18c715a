//! Event-sourcing mechanics shared by the circulation domain and infra.
//!
//! Domain-agnostic: commands, events, envelopes and the pub/sub bus. No
//! business rules live here.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::{Delivery, EventEnvelope};
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
