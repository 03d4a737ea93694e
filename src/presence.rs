//! Presence/arrival state machine.
//!
//! A student moves through `Absent → Present → Arrived` during one operating
//! run. The state is stored as two fields on [`Student`] (`is_present`,
//! `arrived_at`) and derived here; `is_present = false` with `arrived_at` set
//! is never produced.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult, ValidationError};
use crate::student::Student;

/// Per-run presence state of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// Not riding this run (initial).
    Absent,
    /// Riding, waiting to be picked up.
    Present,
    /// Picked up; terminal for the run.
    Arrived,
}

impl PresenceState {
    /// Derives the state from the stored field pair.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ArrivedWhileAbsent`] for the invalid
    /// `(false, Some(_))` combination.
    pub fn of(student: &Student) -> Result<Self, ValidationError> {
        match (student.is_present, student.arrived_at) {
            (false, None) => Ok(Self::Absent),
            (true, None) => Ok(Self::Present),
            (true, Some(_)) => Ok(Self::Arrived),
            (false, Some(_)) => Err(ValidationError::ArrivedWhileAbsent {
                student_id: student.id.clone(),
            }),
        }
    }

    /// Returns true for students still waiting on a route.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Present)
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Present => write!(f, "present"),
            Self::Arrived => write!(f, "arrived"),
        }
    }
}

/// Transitions a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceAction {
    /// `Absent ↔ Present`.
    TogglePresence,
    /// `Present → Arrived`.
    MarkArrived,
}

impl fmt::Display for PresenceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TogglePresence => write!(f, "toggle presence of"),
            Self::MarkArrived => write!(f, "mark arrived"),
        }
    }
}

/// Applies `action` to `student` in place.
///
/// Returns the new state. On error the student is left untouched.
///
/// # Errors
///
/// - [`FleetError::InvalidTransition`] when toggling an arrived student, or
///   marking an absent or already arrived student as arrived.
/// - [`FleetError::Validation`] when the stored pair is already invalid.
pub fn apply(
    student: &mut Student,
    action: PresenceAction,
    now: DateTime<Utc>,
) -> FleetResult<PresenceState> {
    let state = PresenceState::of(student)?;
    let next = match (state, action) {
        (PresenceState::Absent, PresenceAction::TogglePresence) => PresenceState::Present,
        (PresenceState::Present, PresenceAction::TogglePresence) => PresenceState::Absent,
        (PresenceState::Present, PresenceAction::MarkArrived) => PresenceState::Arrived,
        (PresenceState::Arrived, _) | (PresenceState::Absent, PresenceAction::MarkArrived) => {
            return Err(FleetError::InvalidTransition {
                student_id: student.id.clone(),
                state,
                action,
            });
        }
    };

    match next {
        PresenceState::Absent => {
            student.is_present = false;
            student.arrived_at = None;
        }
        PresenceState::Present => student.is_present = true,
        PresenceState::Arrived => student.arrived_at = Some(now),
    }
    Ok(next)
}

/// Returns the student to `Absent` for a new run.
///
/// Returns true if anything changed.
pub fn reset(student: &mut Student) -> bool {
    let changed = student.is_present || student.arrived_at.is_some();
    student.is_present = false;
    student.arrived_at = None;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusId;
    use crate::geo::Coordinates;

    fn student() -> Student {
        Student::new("s1", "Ada", "1 Main St", Coordinates::new(1.0, 2.0), BusId::from("bus1"))
    }

    #[test]
    fn toggle_cycles_between_absent_and_present() {
        let mut s = student();
        let now = Utc::now();
        assert_eq!(PresenceState::of(&s).unwrap(), PresenceState::Absent);
        assert_eq!(apply(&mut s, PresenceAction::TogglePresence, now).unwrap(), PresenceState::Present);
        assert!(s.is_present);
        assert_eq!(apply(&mut s, PresenceAction::TogglePresence, now).unwrap(), PresenceState::Absent);
        assert!(!s.is_present);
        assert!(s.arrived_at.is_none());
    }

    #[test]
    fn mark_arrived_requires_present() {
        let mut s = student();
        let now = Utc::now();
        let err = apply(&mut s, PresenceAction::MarkArrived, now).unwrap_err();
        assert!(matches!(
            err,
            FleetError::InvalidTransition {
                state: PresenceState::Absent,
                action: PresenceAction::MarkArrived,
                ..
            }
        ));
        assert!(s.arrived_at.is_none());

        apply(&mut s, PresenceAction::TogglePresence, now).unwrap();
        assert_eq!(apply(&mut s, PresenceAction::MarkArrived, now).unwrap(), PresenceState::Arrived);
        assert_eq!(s.arrived_at, Some(now));
    }

    #[test]
    fn arrived_is_terminal() {
        let mut s = student();
        let now = Utc::now();
        apply(&mut s, PresenceAction::TogglePresence, now).unwrap();
        apply(&mut s, PresenceAction::MarkArrived, now).unwrap();
        let before = s.clone();

        for action in [PresenceAction::TogglePresence, PresenceAction::MarkArrived] {
            let err = apply(&mut s, action, Utc::now()).unwrap_err();
            assert!(matches!(
                err,
                FleetError::InvalidTransition {
                    state: PresenceState::Arrived,
                    ..
                }
            ));
            assert_eq!(s, before);
        }
    }

    #[test]
    fn corrupt_pair_is_rejected() {
        let mut s = student();
        s.arrived_at = Some(Utc::now());
        assert!(PresenceState::of(&s).is_err());
        assert!(apply(&mut s, PresenceAction::TogglePresence, Utc::now())
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn reset_clears_both_fields() {
        let mut s = student();
        assert!(!reset(&mut s));
        s.is_present = true;
        s.arrived_at = Some(Utc::now());
        assert!(reset(&mut s));
        assert_eq!(PresenceState::of(&s).unwrap(), PresenceState::Absent);
    }
}
