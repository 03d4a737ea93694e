//! Abstract storage trait for the fleet model.
//!
//! The store owns bus and student records and enforces the identity and
//! referential invariants between them. It knows nothing about routes or
//! presence rules; those live in the engine.

use std::fmt;

use thiserror::Error;

use crate::bus::{Bus, BusId};
use crate::snapshot::FleetSnapshot;
use crate::student::{Student, StudentId};

/// Which collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A bus.
    Bus,
    /// A student.
    Student,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "bus"),
            Self::Student => write!(f, "student"),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Id already present.
    #[error("Duplicate {kind} id: {id}")]
    DuplicateId {
        /// Collection.
        kind: RecordKind,
        /// Offending id.
        id: String,
    },

    /// Id not present.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Collection.
        kind: RecordKind,
        /// Missing id.
        id: String,
    },

    /// A student references a bus that does not exist.
    #[error("Student {student_id} references unknown bus {bus_id}")]
    DanglingReference {
        /// The student being written.
        student_id: StudentId,
        /// The unresolved bus.
        bus_id: BusId,
    },

    /// A bus still has students assigned.
    #[error("Cannot delete bus {bus_id}: {dependents} students are assigned")]
    ReferentialIntegrity {
        /// The bus that was to be deleted.
        bus_id: BusId,
        /// How many students reference it.
        dependents: usize,
    },

    /// Backend failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Shorthand for a missing bus.
    #[must_use]
    pub fn bus_not_found(id: &BusId) -> Self {
        Self::NotFound {
            kind: RecordKind::Bus,
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing student.
    #[must_use]
    pub fn student_not_found(id: &StudentId) -> Self {
        Self::NotFound {
            kind: RecordKind::Student,
            id: id.to_string(),
        }
    }
}

/// Storage trait for the bus and student collections.
///
/// List operations return records in insertion order; updates keep a
/// record's position. Every mutation is all-or-nothing.
pub trait FleetStore: Send + Sync {
    /// Insert a new bus. Returns error if the id already exists.
    fn insert_bus(&self, bus: Bus) -> Result<(), StorageError>;

    /// Get a bus by id.
    fn get_bus(&self, id: &BusId) -> Result<Option<Bus>, StorageError>;

    /// Replace an existing bus. Returns error if not found.
    fn update_bus(&self, bus: Bus) -> Result<(), StorageError>;

    /// Delete a bus and return it.
    ///
    /// # Errors
    /// - `NotFound`: no such bus
    /// - `ReferentialIntegrity`: students still reference it; nothing is removed
    fn delete_bus(&self, id: &BusId) -> Result<Bus, StorageError>;

    /// All buses.
    fn list_buses(&self) -> Result<Vec<Bus>, StorageError>;

    /// Insert a new student.
    ///
    /// # Errors
    /// - `DuplicateId`: id already present
    /// - `DanglingReference`: `bus_id` does not resolve
    fn insert_student(&self, student: Student) -> Result<(), StorageError>;

    /// Get a student by id.
    fn get_student(&self, id: &StudentId) -> Result<Option<Student>, StorageError>;

    /// Replace an existing student.
    ///
    /// # Errors
    /// - `NotFound`: no such student
    /// - `DanglingReference`: `bus_id` does not resolve
    fn update_student(&self, student: Student) -> Result<(), StorageError>;

    /// Delete a student and return it.
    fn delete_student(&self, id: &StudentId) -> Result<Student, StorageError>;

    /// All students.
    fn list_students(&self) -> Result<Vec<Student>, StorageError>;

    /// Students assigned to `bus_id`, in store order.
    fn students_for_bus(&self, bus_id: &BusId) -> Result<Vec<Student>, StorageError>;

    /// Return students to `Absent` for a new run, all of them or one bus's.
    ///
    /// Applied under a single write; returns how many students changed.
    ///
    /// # Errors
    /// - `NotFound`: `bus_id` is given and does not resolve
    fn reset_presence(&self, bus_id: Option<&BusId>) -> Result<usize, StorageError>;

    /// Number of students assigned to `bus_id`.
    fn count_students_for_bus(&self, bus_id: &BusId) -> Result<usize, StorageError>;

    /// Copy of both collections.
    fn snapshot(&self) -> Result<FleetSnapshot, StorageError>;

    /// Replace both collections with the snapshot's contents.
    ///
    /// The snapshot is checked for duplicate ids and dangling references
    /// first; on error the current state is kept.
    fn restore(&self, snapshot: &FleetSnapshot) -> Result<(), StorageError>;
}
