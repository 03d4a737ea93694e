//! Student records and identity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::BusId;
use crate::geo::Coordinates;
use crate::presence::PresenceState;

/// Stable student identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Creates a student id from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("student-{}", Uuid::new_v4()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StudentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StudentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A student riding a bus.
///
/// `is_present` and `arrived_at` together encode the run state; see
/// [`PresenceState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Unique id.
    pub id: StudentId,
    /// Display name.
    pub name: String,
    /// Pickup address (free text).
    pub address: String,
    /// Pickup position.
    pub location: Coordinates,
    /// Link a view can open for directions.
    pub maps_link: String,
    /// Owning bus.
    pub bus_id: BusId,
    /// Riding this run.
    #[serde(default)]
    pub is_present: bool,
    /// When the student was picked up this run.
    #[serde(default)]
    pub arrived_at: Option<DateTime<Utc>>,
}

impl Student {
    /// Creates an absent student with a map link derived from `location`.
    #[must_use]
    pub fn new(
        id: impl Into<StudentId>,
        name: impl Into<String>,
        address: impl Into<String>,
        location: Coordinates,
        bus_id: impl Into<BusId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            location,
            maps_link: location.maps_link(),
            bus_id: bus_id.into(),
            is_present: false,
            arrived_at: None,
        }
    }

    /// Sets the presence flag (builder style, for seeding).
    #[must_use]
    pub const fn present(mut self, is_present: bool) -> Self {
        self.is_present = is_present;
        self
    }

    /// Current run state. Invalid pairs read as `Absent`.
    #[must_use]
    pub fn state(&self) -> PresenceState {
        PresenceState::of(self).unwrap_or(PresenceState::Absent)
    }

    /// Present and not yet picked up.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.is_present && self.arrived_at.is_none()
    }

    /// Merges the provided fields. Id and run state never change here.
    pub fn apply_patch(&mut self, patch: &StudentPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(address) = &patch.address {
            self.address.clone_from(address);
        }
        if let Some(location) = patch.location {
            self.location = location;
            if patch.maps_link.is_none() {
                self.maps_link = location.maps_link();
            }
        }
        if let Some(link) = &patch.maps_link {
            self.maps_link.clone_from(link);
            // A bare link that carries coordinates moves the pickup point too.
            if patch.location.is_none() {
                if let Some(location) = Coordinates::from_maps_link(link) {
                    self.location = location;
                }
            }
        }
        if let Some(bus_id) = &patch.bus_id {
            self.bus_id.clone_from(bus_id);
        }
    }
}

/// Input for creating a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentDraft {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<StudentId>,
    /// Display name.
    pub name: String,
    /// Pickup address.
    pub address: String,
    /// Pickup position.
    pub location: Coordinates,
    /// Map link; derived from `location` when absent.
    #[serde(default)]
    pub maps_link: Option<String>,
    /// Owning bus.
    pub bus_id: BusId,
    /// Initial presence; the engine default applies when absent.
    #[serde(default)]
    pub is_present: Option<bool>,
}

impl StudentDraft {
    /// Creates a draft with generated id and link.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        location: Coordinates,
        bus_id: impl Into<BusId>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            address: address.into(),
            location,
            maps_link: None,
            bus_id: bus_id.into(),
            is_present: None,
        }
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<StudentId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets an explicit map link.
    #[must_use]
    pub fn with_maps_link(mut self, link: impl Into<String>) -> Self {
        self.maps_link = Some(link.into());
        self
    }

    /// Sets the initial presence flag.
    #[must_use]
    pub const fn present(mut self, is_present: bool) -> Self {
        self.is_present = Some(is_present);
        self
    }

    /// Turns the draft into a record.
    #[must_use]
    pub fn into_student(self, default_present: bool) -> Student {
        let maps_link = self
            .maps_link
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.location.maps_link());
        Student {
            id: self.id.unwrap_or_else(StudentId::generate),
            name: self.name,
            address: self.address,
            location: self.location,
            maps_link,
            bus_id: self.bus_id,
            is_present: self.is_present.unwrap_or(default_present),
            arrived_at: None,
        }
    }
}

/// Partial update for a student. Presence is not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentPatch {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New address.
    #[serde(default)]
    pub address: Option<String>,
    /// New pickup position; regenerates the link unless one is given.
    #[serde(default)]
    pub location: Option<Coordinates>,
    /// New map link.
    #[serde(default)]
    pub maps_link: Option<String>,
    /// Reassign to another bus.
    #[serde(default)]
    pub bus_id: Option<BusId>,
}

impl StudentPatch {
    /// A patch that only reassigns the bus.
    #[must_use]
    pub fn reassign(bus_id: impl Into<BusId>) -> Self {
        Self {
            bus_id: Some(bus_id.into()),
            ..Self::default()
        }
    }
}
