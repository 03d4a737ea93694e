//! Route sequencing.
//!
//! A route is the ordered list of pending pickups for one bus with an ETA per
//! stop. It is derived from store state on read and never stored as truth.
//! Ordering and scoring sit behind [`RouteStrategy`] so a geographic
//! sequencer can replace the fixed-interval heuristic.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::bus::BusId;
use crate::error::{FleetError, FleetResult};
use crate::student::{Student, StudentId};

/// Minutes allotted per stop by the default strategy.
pub const FIXED_MINUTES_PER_STOP: u32 = 5;

/// One scored pickup produced by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredStop {
    /// Student to pick up.
    pub student_id: StudentId,
    /// Minutes from now.
    pub eta_minutes: u32,
}

/// Orders pending students and assigns ETAs.
pub trait RouteStrategy: Send + Sync {
    /// Returns the stops in visiting order.
    ///
    /// `pending` is already filtered to present, not-yet-arrived students in
    /// store order.
    fn order_and_score(&self, pending: &[Student]) -> Vec<ScoredStop>;
}

/// Keeps store order and spaces stops a fixed number of minutes apart.
///
/// Stop `i` gets `(i + 1) * minutes_per_stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedIntervalStrategy {
    minutes_per_stop: u32,
}

impl FixedIntervalStrategy {
    /// Creates a strategy with a custom interval.
    #[must_use]
    pub const fn new(minutes_per_stop: u32) -> Self {
        Self { minutes_per_stop }
    }

    /// Configured interval.
    #[must_use]
    pub const fn minutes_per_stop(&self) -> u32 {
        self.minutes_per_stop
    }
}

impl Default for FixedIntervalStrategy {
    fn default() -> Self {
        Self::new(FIXED_MINUTES_PER_STOP)
    }
}

impl RouteStrategy for FixedIntervalStrategy {
    fn order_and_score(&self, pending: &[Student]) -> Vec<ScoredStop> {
        pending
            .iter()
            .zip(1u32..)
            .map(|(student, n)| ScoredStop {
                student_id: student.id.clone(),
                eta_minutes: n.saturating_mul(self.minutes_per_stop),
            })
            .collect()
    }
}

/// A stop on a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    /// Student to pick up.
    pub student_id: StudentId,
    /// Zero-based position on the route.
    pub position: usize,
    /// Minutes from now.
    pub eta_minutes: u32,
}

/// Pending pickups for one bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// The bus.
    pub bus_id: BusId,
    /// Stops in visiting order.
    pub stops: Vec<RouteStop>,
    /// ETA of the last stop; zero for an empty route.
    pub total_eta_minutes: u32,
}

impl Route {
    /// Number of pending stops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// True when every present student has been picked up.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Next student to pick up.
    #[must_use]
    pub fn next_stop(&self) -> Option<&RouteStop> {
        self.stops.first()
    }
}

#[derive(Debug)]
struct CachedRoute {
    version: u64,
    route: Route,
}

#[derive(Debug, Default)]
struct Versions {
    clock: u64,
    // Version of every bus not in `per_bus`; moves on `invalidate_all`.
    epoch: u64,
    per_bus: HashMap<BusId, u64>,
}

impl Versions {
    fn of(&self, bus_id: &BusId) -> u64 {
        self.per_bus.get(bus_id).copied().unwrap_or(self.epoch)
    }
}

/// Derives routes and memoizes them per bus.
///
/// Each bus carries a version taken from a monotonic clock. Mutations call
/// [`RouteSequencer::invalidate`] for every bus they touch; a cached route is
/// reused only while its version still matches. Buses never invalidated on
/// their own share the epoch set by the last [`RouteSequencer::invalidate_all`].
pub struct RouteSequencer {
    strategy: Box<dyn RouteStrategy>,
    versions: Mutex<Versions>,
    cache: Option<Mutex<HashMap<BusId, CachedRoute>>>,
}

impl RouteSequencer {
    /// Creates a sequencer with the given strategy.
    #[must_use]
    pub fn new(strategy: Box<dyn RouteStrategy>, memoize: bool) -> Self {
        Self {
            strategy,
            versions: Mutex::new(Versions::default()),
            cache: memoize.then(|| Mutex::new(HashMap::new())),
        }
    }

    /// Current version of a bus's route.
    pub fn version(&self, bus_id: &BusId) -> FleetResult<u64> {
        let versions = self
            .versions
            .lock()
            .map_err(|_| FleetError::internal("route version lock poisoned"))?;
        Ok(versions.of(bus_id))
    }

    /// Marks a bus's route stale.
    pub fn invalidate(&self, bus_id: &BusId) -> FleetResult<()> {
        let mut versions = self
            .versions
            .lock()
            .map_err(|_| FleetError::internal("route version lock poisoned"))?;
        versions.clock += 1;
        let next = versions.clock;
        versions.per_bus.insert(bus_id.clone(), next);
        Ok(())
    }

    /// Marks every route stale.
    pub fn invalidate_all(&self) -> FleetResult<()> {
        let mut versions = self
            .versions
            .lock()
            .map_err(|_| FleetError::internal("route version lock poisoned"))?;
        versions.clock += 1;
        versions.epoch = versions.clock;
        versions.per_bus.clear();
        drop(versions);
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .map_err(|_| FleetError::internal("route cache lock poisoned"))?
                .clear();
        }
        Ok(())
    }

    /// Drops all state about a deleted bus.
    pub fn forget(&self, bus_id: &BusId) -> FleetResult<()> {
        self.versions
            .lock()
            .map_err(|_| FleetError::internal("route version lock poisoned"))?
            .per_bus
            .remove(bus_id);
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .map_err(|_| FleetError::internal("route cache lock poisoned"))?
                .remove(bus_id);
        }
        Ok(())
    }

    /// Returns the route for `bus_id`, computing it from `students` on a miss.
    ///
    /// `students` is called at most once and must return the bus's students
    /// in store order.
    pub fn route<F>(&self, bus_id: &BusId, students: F) -> FleetResult<Route>
    where
        F: FnOnce() -> FleetResult<Vec<Student>>,
    {
        let version = self.version(bus_id)?;

        if let Some(cache) = &self.cache {
            let guard = cache
                .lock()
                .map_err(|_| FleetError::internal("route cache lock poisoned"))?;
            if let Some(hit) = guard.get(bus_id).filter(|c| c.version == version) {
                return Ok(hit.route.clone());
            }
        }

        let route = self.compute(bus_id, &students()?);

        if let Some(cache) = &self.cache {
            let mut guard = cache
                .lock()
                .map_err(|_| FleetError::internal("route cache lock poisoned"))?;
            // A mutation that landed while loading makes this route stale.
            if self.version(bus_id)? == version {
                guard.insert(
                    bus_id.clone(),
                    CachedRoute {
                        version,
                        route: route.clone(),
                    },
                );
            }
        }
        Ok(route)
    }

    /// Pure derivation with no caching.
    #[must_use]
    pub fn compute(&self, bus_id: &BusId, students: &[Student]) -> Route {
        let pending: Vec<Student> = students
            .iter()
            .filter(|s| &s.bus_id == bus_id && s.is_pending())
            .cloned()
            .collect();

        let stops: Vec<RouteStop> = self
            .strategy
            .order_and_score(&pending)
            .into_iter()
            .enumerate()
            .map(|(position, scored)| RouteStop {
                student_id: scored.student_id,
                position,
                eta_minutes: scored.eta_minutes,
            })
            .collect();

        let total_eta_minutes = stops.iter().map(|s| s.eta_minutes).max().unwrap_or(0);
        Route {
            bus_id: bus_id.clone(),
            stops,
            total_eta_minutes,
        }
    }
}

impl Default for RouteSequencer {
    fn default() -> Self {
        Self::new(Box::new(FixedIntervalStrategy::default()), true)
    }
}

impl std::fmt::Debug for RouteSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteSequencer")
            .field("memoize", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
