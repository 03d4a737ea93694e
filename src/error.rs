//! Error types for busroute.
//!
//! All errors are strongly typed using thiserror so callers (usually a view
//! layer) can match on the failure kind and map it to their own wording.

use thiserror::Error;

use crate::config::ConfigError;
use crate::presence::{PresenceAction, PresenceState};
use crate::snapshot::SnapshotError;
use crate::storage::StorageError;
use crate::student::StudentId;

/// Validation errors raised before the store is touched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A coordinate component is NaN or infinite.
    #[error("Coordinate '{field}' must be a finite number, got {value}")]
    NonFiniteCoordinate {
        /// Which component (`lat` or `lng`).
        field: &'static str,
        /// The offending value.
        value: f64,
    },

    /// A coordinate component is outside its valid range.
    #[error("Coordinate '{field}' value {value} is out of range [{min}, {max}]")]
    CoordinateOutOfRange {
        /// Which component (`lat` or `lng`).
        field: &'static str,
        /// The offending value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },

    /// Raw text could not be parsed as a number.
    #[error("Field '{field}' is not a number: '{input}'")]
    NotANumber {
        /// Field name.
        field: &'static str,
        /// The raw input.
        input: String,
    },

    /// A required field is empty or whitespace.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A text field is longer than allowed.
    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        /// Field name.
        field: String,
        /// Maximum length in bytes.
        max_length: usize,
    },

    /// A stored record holds a state combination the engine never produces.
    #[error("Student {student_id} is marked arrived while absent")]
    ArrivedWhileAbsent {
        /// The offending student.
        student_id: StudentId,
    },
}

/// Failures of the single-writer runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The command queue is at capacity.
    #[error("Command queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// The worker is gone.
    #[error("Runtime worker disconnected")]
    Disconnected,

    /// No reply arrived in time.
    #[error("Command timed out after {duration_ms}ms")]
    Timeout {
        /// Elapsed wait.
        duration_ms: u64,
    },
}

/// Coarse classification of a [`FleetError`].
///
/// Views map these to user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An id is already taken.
    DuplicateId,
    /// A referenced record does not exist.
    NotFound,
    /// A student points at a bus that does not exist.
    DanglingReference,
    /// A bus cannot be deleted while students reference it.
    ReferentialIntegrity,
    /// Illegal presence/arrival transition.
    InvalidTransition,
    /// Malformed input.
    Validation,
    /// Runtime queue failure.
    Runtime,
    /// Snapshot encoding or file failure.
    Snapshot,
    /// Configuration failure.
    Config,
    /// Anything else.
    Internal,
}

/// Top-level error type for busroute.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The entity store rejected the operation.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Illegal presence/arrival transition.
    #[error("Cannot {action} student {student_id} while {state}")]
    InvalidTransition {
        /// Student the transition was attempted on.
        student_id: StudentId,
        /// State the student was in.
        state: PresenceState,
        /// Attempted action.
        action: PresenceAction,
    },

    /// Runtime queue failure.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Snapshot encoding or file failure.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Configuration failure.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Detail.
        message: String,
    },
}

impl FleetError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Storage(e) => match e {
                StorageError::DuplicateId { .. } => ErrorKind::DuplicateId,
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::DanglingReference { .. } => ErrorKind::DanglingReference,
                StorageError::ReferentialIntegrity { .. } => ErrorKind::ReferentialIntegrity,
                StorageError::Backend(_) => ErrorKind::Internal,
            },
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Snapshot(_) => ErrorKind::Snapshot,
            Self::Config(_) => ErrorKind::Config,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the same command could succeed.
    ///
    /// Only a full queue qualifies; engine failures are deterministic.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Runtime(RuntimeError::QueueFull { .. }))
    }
}

/// Result type alias for busroute operations.
pub type FleetResult<T> = Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusId;
    use crate::storage::RecordKind;

    #[test]
    fn test_validation_error_coordinate_range() {
        let err = ValidationError::CoordinateOutOfRange {
            field: "lat",
            value: 91.0,
            min: -90.0,
            max: 90.0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("lat"));
        assert!(msg.contains("91"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_kind_maps_storage_variants() {
        let err: FleetError = StorageError::ReferentialIntegrity {
            bus_id: BusId::from("bus1"),
            dependents: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
        assert!(err.is_storage());
        assert!(format!("{err}").contains("2 students are assigned"));

        let err: FleetError = StorageError::NotFound {
            kind: RecordKind::Bus,
            id: "bus9".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = FleetError::InvalidTransition {
            student_id: StudentId::from("s1"),
            state: PresenceState::Arrived,
            action: PresenceAction::TogglePresence,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        let msg = format!("{err}");
        assert!(msg.contains("s1"));
        assert!(msg.contains("arrived"));
    }

    #[test]
    fn test_only_queue_full_is_retryable() {
        let full: FleetError = RuntimeError::QueueFull { capacity: 4 }.into();
        assert!(full.is_retryable());

        let gone: FleetError = RuntimeError::Disconnected.into();
        assert!(!gone.is_retryable());

        let invalid: FleetError = ValidationError::MissingField {
            field: "name".to_string(),
        }
        .into();
        assert!(invalid.is_validation());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_internal() {
        let err = FleetError::internal("unexpected state");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(format!("{err}").contains("unexpected state"));
    }
}
