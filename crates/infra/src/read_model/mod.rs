//! Disposable read model storage abstractions.

pub mod store;

pub use store::{InMemoryReadModelStore, ReadModelStore};
