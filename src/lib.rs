//! # busroute - route/state engine for a school-bus fleet
//!
//! busroute is the authoritative in-memory model of buses, the students
//! assigned to them, and the pickup routes derived from student state. Views
//! (forms, maps, dashboards) sit on top and only talk to the engine through
//! its Mutation API and queries.
//!
//! ## Core Concepts
//!
//! - **Bus / Student**: records held by a [`FleetStore`], with unique ids and
//!   a required student → bus reference
//! - **Presence**: each student moves `Absent → Present → Arrived` per run
//! - **Route**: the ordered list of present, not yet arrived students of a
//!   bus, each with an ETA; derived on read, never stored
//! - **FleetEngine**: the only writer; validates input and keeps routes fresh
//!
//! ## Usage
//!
//! ```
//! use busroute::{BusDraft, BusId, Coordinates, FleetEngine, StudentDraft, StudentId};
//!
//! let engine = FleetEngine::in_memory();
//! engine.add_bus(BusDraft::new("North", "Ann", Coordinates::new(40.71, -74.0)).with_id("bus1"))?;
//! engine.add_student(
//!     StudentDraft::new("Ada", "1 Main St", Coordinates::new(40.72, -74.01), "bus1").with_id("ada"),
//! )?;
//!
//! let route = engine.get_route(&BusId::from("bus1"))?;
//! assert_eq!(route.stops[0].eta_minutes, 5);
//!
//! engine.mark_arrived(&StudentId::from("ada"))?;
//! assert!(engine.get_route(&BusId::from("bus1"))?.is_empty());
//! # Ok::<(), busroute::FleetError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Records
pub mod bus;
pub mod geo;
pub mod presence;
pub mod student;

// Engine
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod route;
pub mod snapshot;
pub mod storage;
pub mod summary;
pub mod validation;

// Re-export primary types at crate root for convenience
pub use bus::{Bus, BusDraft, BusId, BusPatch};
pub use command::{CommandEnvelope, Operation};
pub use config::{BusrouteConfig, ConfigLoader, EngineConfig, RuntimeConfig};
pub use engine::runtime::{CommandHandle, FleetRuntime};
pub use engine::{EngineResponse, FleetEngine};
pub use error::{ErrorKind, FleetError, FleetResult, RuntimeError, ValidationError};
pub use geo::Coordinates;
pub use presence::{PresenceAction, PresenceState};
pub use route::{FixedIntervalStrategy, Route, RouteStop, RouteStrategy, ScoredStop};
pub use snapshot::{read_snapshot_file, write_snapshot_file, FleetSnapshot, SnapshotError};
pub use storage::{FleetStore, InMemoryFleetStore, RecordKind, StorageError};
pub use student::{Student, StudentDraft, StudentId, StudentPatch};
pub use summary::{BusSummary, FleetSummary, MapMarker, MarkerKind};
