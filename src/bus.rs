//! Bus records and identity.
//!
//! Buses are the anchor of the fleet model. Every student references exactly
//! one bus, and a bus cannot leave the store while it is still referenced.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinates;

/// Stable bus identifier.
///
/// Ids are opaque strings so callers can bring their own (`"bus1"`), or let
/// the engine generate one with [`BusId::generate`].
///
/// # Examples
///
/// ```
/// use busroute::BusId;
///
/// let id = BusId::from("bus1");
/// assert_eq!(id.as_str(), "bus1");
/// assert!(BusId::generate().as_str().starts_with("bus-"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(String);

impl BusId {
    /// Creates a bus id from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("bus-{}", Uuid::new_v4()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BusId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BusId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A bus in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    /// Unique id.
    pub id: BusId,
    /// Display name.
    pub name: String,
    /// Driver shown on the dashboard.
    pub driver_name: String,
    /// Last known position.
    pub location: Coordinates,
    /// Whether the bus is in service.
    pub is_active: bool,
}

impl Bus {
    /// Creates an active bus.
    #[must_use]
    pub fn new(
        id: impl Into<BusId>,
        name: impl Into<String>,
        driver_name: impl Into<String>,
        location: Coordinates,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            driver_name: driver_name.into(),
            location,
            is_active: true,
        }
    }

    /// Map link for the bus's current position.
    #[must_use]
    pub fn maps_link(&self) -> String {
        self.location.maps_link()
    }

    /// Merges the provided fields. The id never changes.
    pub fn apply_patch(&mut self, patch: &BusPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(driver) = &patch.driver_name {
            self.driver_name.clone_from(driver);
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
    }
}

/// Input for creating a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusDraft {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<BusId>,
    /// Display name.
    pub name: String,
    /// Driver name.
    pub driver_name: String,
    /// Starting position.
    pub location: Coordinates,
    /// Whether the bus starts in service.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

impl BusDraft {
    /// Creates an active draft with a generated id.
    #[must_use]
    pub fn new(name: impl Into<String>, driver_name: impl Into<String>, location: Coordinates) -> Self {
        Self {
            id: None,
            name: name.into(),
            driver_name: driver_name.into(),
            location,
            is_active: true,
        }
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<BusId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub const fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Turns the draft into a record, generating an id if needed.
    #[must_use]
    pub fn into_bus(self) -> Bus {
        Bus {
            id: self.id.unwrap_or_else(BusId::generate),
            name: self.name,
            driver_name: self.driver_name,
            location: self.location,
            is_active: self.is_active,
        }
    }
}

/// Partial update for a bus. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusPatch {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New driver name.
    #[serde(default)]
    pub driver_name: Option<String>,
    /// New position (live feeds arrive as location-only patches).
    #[serde(default)]
    pub location: Option<Coordinates>,
    /// New active flag.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl BusPatch {
    /// A patch that only moves the bus.
    #[must_use]
    pub fn location(location: Coordinates) -> Self {
        Self {
            location: Some(location),
            ..Self::default()
        }
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.driver_name.is_none()
            && self.location.is_none()
            && self.is_active.is_none()
    }
}
