//! Per-bus counters and display markers.
//!
//! These are read models for dashboards and maps. They are computed from the
//! same state as routes and carry no authority of their own.

use serde::{Deserialize, Serialize};

use crate::bus::{Bus, BusId};
use crate::geo::Coordinates;
use crate::route::Route;
use crate::student::{Student, StudentId};

/// Counters for one bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusSummary {
    /// The bus.
    pub bus_id: BusId,
    /// Display name.
    pub name: String,
    /// Driver name.
    pub driver_name: String,
    /// In service.
    pub is_active: bool,
    /// Students assigned to the bus.
    pub assigned: usize,
    /// Present students, picked up or not (total stops this run).
    pub present: usize,
    /// Present students still waiting.
    pub remaining: usize,
    /// Students already picked up.
    pub arrived: usize,
    /// ETA of the last pending stop.
    pub total_eta_minutes: u32,
}

impl BusSummary {
    /// Builds the summary from the bus, its students and its current route.
    #[must_use]
    pub fn new(bus: &Bus, students: &[Student], route: &Route) -> Self {
        let mine = || students.iter().filter(|s| s.bus_id == bus.id);
        Self {
            bus_id: bus.id.clone(),
            name: bus.name.clone(),
            driver_name: bus.driver_name.clone(),
            is_active: bus.is_active,
            assigned: mine().count(),
            present: mine().filter(|s| s.is_present).count(),
            remaining: route.len(),
            arrived: mine().filter(|s| s.arrived_at.is_some()).count(),
            total_eta_minutes: route.total_eta_minutes,
        }
    }

    /// True once every present student has been picked up.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Counters for the whole fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    /// One entry per bus, in store order.
    pub buses: Vec<BusSummary>,
}

impl FleetSummary {
    /// Buses currently in service.
    #[must_use]
    pub fn active_buses(&self) -> usize {
        self.buses.iter().filter(|b| b.is_active).count()
    }

    /// Students assigned across the fleet.
    #[must_use]
    pub fn total_students(&self) -> usize {
        self.buses.iter().map(|b| b.assigned).sum()
    }

    /// Students picked up across the fleet.
    #[must_use]
    pub fn total_arrived(&self) -> usize {
        self.buses.iter().map(|b| b.arrived).sum()
    }

    /// Students still waiting across the fleet.
    #[must_use]
    pub fn total_remaining(&self) -> usize {
        self.buses.iter().map(|b| b.remaining).sum()
    }
}

/// What a marker stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// A bus position.
    Bus,
    /// A student still to be picked up (or absent).
    WaitingStudent,
    /// A student already picked up.
    PickedUpStudent,
}

/// A point a map view can draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    /// Marker type.
    pub kind: MarkerKind,
    /// Bus or student id.
    pub id: String,
    /// Title text.
    pub title: String,
    /// Secondary text (driver or address).
    pub detail: String,
    /// Position.
    pub location: Coordinates,
    /// Link to open externally.
    pub maps_link: String,
}

impl MapMarker {
    /// Marker for a bus.
    #[must_use]
    pub fn for_bus(bus: &Bus) -> Self {
        Self {
            kind: MarkerKind::Bus,
            id: bus.id.to_string(),
            title: bus.name.clone(),
            detail: format!("Driver: {}", bus.driver_name),
            location: bus.location,
            maps_link: bus.maps_link(),
        }
    }

    /// Marker for a student.
    #[must_use]
    pub fn for_student(student: &Student) -> Self {
        let kind = if student.arrived_at.is_some() {
            MarkerKind::PickedUpStudent
        } else {
            MarkerKind::WaitingStudent
        };
        Self {
            kind,
            id: student.id.to_string(),
            title: student.name.clone(),
            detail: student.address.clone(),
            location: student.location,
            maps_link: student.maps_link.clone(),
        }
    }

    /// Markers for all buses followed by all students.
    #[must_use]
    pub fn collect(buses: &[Bus], students: &[Student]) -> Vec<Self> {
        buses
            .iter()
            .map(Self::for_bus)
            .chain(students.iter().map(Self::for_student))
            .collect()
    }
}

/// Picked-up students of one bus with their pickup time, oldest first.
#[must_use]
pub fn completed_pickups(bus_id: &BusId, students: &[Student]) -> Vec<(StudentId, chrono::DateTime<chrono::Utc>)> {
    let mut done: Vec<_> = students
        .iter()
        .filter(|s| &s.bus_id == bus_id)
        .filter_map(|s| s.arrived_at.map(|at| (s.id.clone(), at)))
        .collect();
    done.sort_by_key(|(_, at)| *at);
    done
}
