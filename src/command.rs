//! Serializable command/query surface.
//!
//! Every engine operation has a matching [`Operation`] variant so views (or a
//! queue in front of the engine) can submit work as data. Envelopes carry a
//! request id for log correlation and the timestamp used for arrivals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::{BusDraft, BusId, BusPatch};
use crate::snapshot::FleetSnapshot;
use crate::student::{StudentDraft, StudentId, StudentPatch};

/// Wrapper around every submitted operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Protocol version.
    pub version: String,

    /// Unique identifier for this request (for tracing/debugging).
    pub request_id: Uuid,

    /// When the command was issued. Used as the arrival time.
    pub timestamp: DateTime<Utc>,

    /// The operation to execute.
    pub operation: Operation,
}

impl CommandEnvelope {
    /// Current protocol version.
    pub const CURRENT_VERSION: &'static str = "1.0";

    /// Wraps an operation stamped with the current time.
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
        }
    }

    /// Sets a custom request ID (useful for correlation).
    #[must_use]
    pub const fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Overrides the timestamp (replays, tests).
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl From<Operation> for CommandEnvelope {
    fn from(operation: Operation) -> Self {
        Self::new(operation)
    }
}

/// All supported operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum Operation {
    /// Create a bus.
    AddBus(BusDraft),

    /// Merge fields into a bus.
    UpdateBus {
        /// Target bus.
        id: BusId,
        /// Fields to change.
        patch: BusPatch,
    },

    /// Delete an unreferenced bus.
    DeleteBus {
        /// Target bus.
        id: BusId,
    },

    /// Create a student.
    AddStudent(StudentDraft),

    /// Merge fields into a student.
    UpdateStudent {
        /// Target student.
        id: StudentId,
        /// Fields to change.
        patch: StudentPatch,
    },

    /// Delete a student.
    DeleteStudent {
        /// Target student.
        id: StudentId,
    },

    /// `Absent ↔ Present`.
    TogglePresence {
        /// Target student.
        student_id: StudentId,
    },

    /// `Present → Arrived`.
    MarkArrived {
        /// Target student.
        student_id: StudentId,
    },

    /// Start a new run for the whole fleet.
    ResetRun,

    /// Start a new run for one bus.
    ResetBusRun {
        /// Target bus.
        bus_id: BusId,
    },

    /// Replace all state.
    ImportSnapshot(FleetSnapshot),

    /// List buses.
    ListBuses,

    /// List students, optionally for one bus.
    ListStudents {
        /// Filter.
        #[serde(default)]
        bus_id: Option<BusId>,
    },

    /// Pending route for a bus.
    GetRoute {
        /// Target bus.
        bus_id: BusId,
    },

    /// Picked-up students of a bus with pickup times.
    CompletedPickups {
        /// Target bus.
        bus_id: BusId,
    },

    /// Counters for every bus.
    FleetSummary,

    /// Export all state.
    ExportSnapshot,
}

impl Operation {
    /// True for operations that change engine state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::ListBuses
                | Self::ListStudents { .. }
                | Self::GetRoute { .. }
                | Self::CompletedPickups { .. }
                | Self::FleetSummary
                | Self::ExportSnapshot
        )
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddBus(_) => "add_bus",
            Self::UpdateBus { .. } => "update_bus",
            Self::DeleteBus { .. } => "delete_bus",
            Self::AddStudent(_) => "add_student",
            Self::UpdateStudent { .. } => "update_student",
            Self::DeleteStudent { .. } => "delete_student",
            Self::TogglePresence { .. } => "toggle_presence",
            Self::MarkArrived { .. } => "mark_arrived",
            Self::ResetRun => "reset_run",
            Self::ResetBusRun { .. } => "reset_bus_run",
            Self::ImportSnapshot(_) => "import_snapshot",
            Self::ListBuses => "list_buses",
            Self::ListStudents { .. } => "list_students",
            Self::GetRoute { .. } => "get_route",
            Self::CompletedPickups { .. } => "completed_pickups",
            Self::FleetSummary => "fleet_summary",
            Self::ExportSnapshot => "export_snapshot",
        }
    }
}
