//! Entity store for buses and students.
//!
//! [`FleetStore`] is the abstract interface; [`InMemoryFleetStore`] is the
//! backend the engine uses by default.

/// In-memory backend.
pub mod memory;
mod traits;

pub use memory::InMemoryFleetStore;
pub use traits::{FleetStore, RecordKind, StorageError};
