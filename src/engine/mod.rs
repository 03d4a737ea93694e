//! Fleet engine: the Mutation API and query surface.
//!
//! [`FleetEngine`] is the only legal way to change fleet state. It validates
//! input, applies presence rules, writes through a [`FleetStore`] and keeps
//! the route sequencer's versions current. Mutations are serialized by an
//! internal writer lock; reads run concurrently.

/// Single-writer command runtime.
pub mod runtime;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::bus::{Bus, BusDraft, BusId, BusPatch};
use crate::command::{CommandEnvelope, Operation};
use crate::config::EngineConfig;
use crate::error::{FleetError, FleetResult};
use crate::presence::{self, PresenceAction, PresenceState};
use crate::route::{FixedIntervalStrategy, Route, RouteSequencer, RouteStrategy};
use crate::snapshot::FleetSnapshot;
use crate::storage::{FleetStore, InMemoryFleetStore, StorageError};
use crate::student::{Student, StudentDraft, StudentId, StudentPatch};
use crate::summary::{self, BusSummary, FleetSummary, MapMarker};
use crate::validation;

/// Result of executing an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResponse {
    /// A bus was created or updated.
    Bus(Bus),
    /// A bus was deleted.
    BusDeleted(Bus),
    /// A student was created or updated.
    Student(Student),
    /// A student was deleted.
    StudentDeleted(Student),
    /// A presence transition was applied.
    Presence {
        /// The updated student.
        student: Student,
        /// Its new state.
        state: PresenceState,
    },
    /// A run reset finished.
    RunReset {
        /// Students whose state changed.
        reset: usize,
    },
    /// A snapshot was imported.
    Imported {
        /// Buses now in the store.
        buses: usize,
        /// Students now in the store.
        students: usize,
    },
    /// Bus listing.
    Buses(Vec<Bus>),
    /// Student listing.
    Students(Vec<Student>),
    /// A route.
    Route(Route),
    /// Completed pickups, oldest first.
    Pickups(Vec<(StudentId, DateTime<Utc>)>),
    /// Fleet counters.
    Summary(FleetSummary),
    /// Exported state.
    Snapshot(FleetSnapshot),
}

/// The fleet engine.
pub struct FleetEngine {
    store: Arc<dyn FleetStore>,
    sequencer: RouteSequencer,
    config: EngineConfig,
    writer: Mutex<()>,
}

impl FleetEngine {
    /// Create an engine over the given store with default settings.
    #[must_use]
    pub fn new(store: Arc<dyn FleetStore>) -> Self {
        let config = EngineConfig::default();
        let strategy = FixedIntervalStrategy::new(config.minutes_per_stop);
        Self::build(store, config, Box::new(strategy))
    }

    /// Create an engine over an empty in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryFleetStore::new()))
    }

    /// Create an engine using the fixed-interval strategy from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Config`] if `config` fails validation.
    pub fn with_config(store: Arc<dyn FleetStore>, config: EngineConfig) -> FleetResult<Self> {
        let strategy = FixedIntervalStrategy::new(config.minutes_per_stop);
        Self::with_strategy(store, config, Box::new(strategy))
    }

    /// Create an engine with an explicit route strategy.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Config`] if `config` fails validation.
    pub fn with_strategy(
        store: Arc<dyn FleetStore>,
        config: EngineConfig,
        strategy: Box<dyn RouteStrategy>,
    ) -> FleetResult<Self> {
        config.validate()?;
        Ok(Self::build(store, config, strategy))
    }

    fn build(
        store: Arc<dyn FleetStore>,
        config: EngineConfig,
        strategy: Box<dyn RouteStrategy>,
    ) -> Self {
        let sequencer = RouteSequencer::new(strategy, config.memoize_routes);
        Self {
            store,
            sequencer,
            config,
            writer: Mutex::new(()),
        }
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &Arc<dyn FleetStore> {
        &self.store
    }

    /// Active configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn write_guard(&self) -> FleetResult<MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|_| FleetError::internal("engine writer lock poisoned"))
    }

    fn require_bus(&self, id: &BusId) -> FleetResult<Bus> {
        self.store
            .get_bus(id)?
            .ok_or_else(|| StorageError::bus_not_found(id).into())
    }

    fn require_student(&self, id: &StudentId) -> FleetResult<Student> {
        self.store
            .get_student(id)?
            .ok_or_else(|| StorageError::student_not_found(id).into())
    }

    // ---- buses ----

    /// Create a bus.
    pub fn add_bus(&self, draft: BusDraft) -> FleetResult<Bus> {
        validation::validate_bus_draft(&draft)?;
        let bus = draft.into_bus();
        let _w = self.write_guard()?;
        self.store.insert_bus(bus.clone())?;
        info!(bus_id = %bus.id, name = %bus.name, "bus added");
        Ok(bus)
    }

    /// Merge fields into a bus. Does not affect routes.
    pub fn update_bus(&self, id: &BusId, patch: &BusPatch) -> FleetResult<Bus> {
        validation::validate_bus_patch(patch)?;
        let _w = self.write_guard()?;
        let mut bus = self.require_bus(id)?;
        bus.apply_patch(patch);
        self.store.update_bus(bus.clone())?;
        debug!(bus_id = %id, "bus updated");
        Ok(bus)
    }

    /// Delete a bus that no student references.
    ///
    /// # Errors
    /// - `NotFound` if the bus does not exist
    /// - `ReferentialIntegrity` with the number of assigned students
    pub fn delete_bus(&self, id: &BusId) -> FleetResult<Bus> {
        let _w = self.write_guard()?;
        self.require_bus(id)?;
        let dependents = self.store.count_students_for_bus(id)?;
        if dependents > 0 {
            warn!(bus_id = %id, dependents, "refusing to delete bus with assigned students");
            return Err(StorageError::ReferentialIntegrity {
                bus_id: id.clone(),
                dependents,
            }
            .into());
        }
        let bus = self.store.delete_bus(id)?;
        self.sequencer.forget(id)?;
        info!(bus_id = %id, "bus deleted");
        Ok(bus)
    }

    // ---- students ----

    /// Create a student.
    pub fn add_student(&self, draft: StudentDraft) -> FleetResult<Student> {
        validation::validate_student_draft(&draft)?;
        let student = draft.into_student(self.config.present_on_create);
        let _w = self.write_guard()?;
        self.store.insert_student(student.clone())?;
        self.sequencer.invalidate(&student.bus_id)?;
        info!(student_id = %student.id, bus_id = %student.bus_id, "student added");
        Ok(student)
    }

    /// Merge fields into a student. Reassignment invalidates both buses.
    pub fn update_student(&self, id: &StudentId, patch: &StudentPatch) -> FleetResult<Student> {
        validation::validate_student_patch(patch)?;
        let _w = self.write_guard()?;
        let mut student = self.require_student(id)?;
        let previous_bus = student.bus_id.clone();
        student.apply_patch(patch);
        self.store.update_student(student.clone())?;
        self.sequencer.invalidate(&previous_bus)?;
        if student.bus_id != previous_bus {
            self.sequencer.invalidate(&student.bus_id)?;
            info!(student_id = %id, from = %previous_bus, to = %student.bus_id, "student reassigned");
        } else {
            debug!(student_id = %id, "student updated");
        }
        Ok(student)
    }

    /// Delete a student.
    pub fn delete_student(&self, id: &StudentId) -> FleetResult<Student> {
        let _w = self.write_guard()?;
        let student = self.store.delete_student(id)?;
        self.sequencer.invalidate(&student.bus_id)?;
        info!(student_id = %id, "student deleted");
        Ok(student)
    }

    // ---- presence ----

    fn transition(
        &self,
        id: &StudentId,
        action: PresenceAction,
        now: DateTime<Utc>,
    ) -> FleetResult<(Student, PresenceState)> {
        let _w = self.write_guard()?;
        let mut student = self.require_student(id)?;
        let state = presence::apply(&mut student, action, now).inspect_err(|e| {
            debug!(student_id = %id, %action, error = %e, "presence transition rejected");
        })?;
        self.store.update_student(student.clone())?;
        self.sequencer.invalidate(&student.bus_id)?;
        debug!(student_id = %id, %state, "presence changed");
        Ok((student, state))
    }

    /// `Absent ↔ Present`. Fails with `InvalidTransition` once arrived.
    pub fn toggle_presence(&self, id: &StudentId) -> FleetResult<Student> {
        self.transition(id, PresenceAction::TogglePresence, Utc::now())
            .map(|(s, _)| s)
    }

    /// `Present → Arrived`, stamped with the current time.
    pub fn mark_arrived(&self, id: &StudentId) -> FleetResult<Student> {
        self.mark_arrived_at(id, Utc::now())
    }

    /// `Present → Arrived` with an explicit timestamp.
    pub fn mark_arrived_at(&self, id: &StudentId, at: DateTime<Utc>) -> FleetResult<Student> {
        self.transition(id, PresenceAction::MarkArrived, at)
            .map(|(s, _)| s)
    }

    /// Start a new operating run: every student back to `Absent`.
    ///
    /// When and how often this runs is up to the caller.
    pub fn reset_run(&self) -> FleetResult<usize> {
        let _w = self.write_guard()?;
        let reset = self.store.reset_presence(None)?;
        self.sequencer.invalidate_all()?;
        info!(reset, "operating run reset");
        Ok(reset)
    }

    /// Start a new run for one bus.
    pub fn reset_bus_run(&self, bus_id: &BusId) -> FleetResult<usize> {
        let _w = self.write_guard()?;
        self.require_bus(bus_id)?;
        let reset = self.store.reset_presence(Some(bus_id))?;
        self.sequencer.invalidate(bus_id)?;
        info!(bus_id = %bus_id, reset, "bus run reset");
        Ok(reset)
    }

    // ---- queries ----

    /// All buses in store order.
    pub fn list_buses(&self) -> FleetResult<Vec<Bus>> {
        Ok(self.store.list_buses()?)
    }

    /// All students in store order.
    pub fn list_students(&self) -> FleetResult<Vec<Student>> {
        Ok(self.store.list_students()?)
    }

    /// Students assigned to a bus, in store order.
    pub fn students_for_bus(&self, bus_id: &BusId) -> FleetResult<Vec<Student>> {
        Ok(self.store.students_for_bus(bus_id)?)
    }

    /// Look up a bus.
    pub fn bus(&self, id: &BusId) -> FleetResult<Option<Bus>> {
        Ok(self.store.get_bus(id)?)
    }

    /// Look up a student.
    pub fn student(&self, id: &StudentId) -> FleetResult<Option<Student>> {
        Ok(self.store.get_student(id)?)
    }

    /// Pending pickups for a bus with ETAs.
    ///
    /// # Errors
    /// - `NotFound` if the bus does not exist
    pub fn get_route(&self, bus_id: &BusId) -> FleetResult<Route> {
        self.require_bus(bus_id)?;
        self.sequencer
            .route(bus_id, || Ok(self.store.students_for_bus(bus_id)?))
    }

    /// Current route version of a bus.
    pub fn route_version(&self, bus_id: &BusId) -> FleetResult<u64> {
        self.sequencer.version(bus_id)
    }

    /// Students of a bus already picked up this run, oldest pickup first.
    pub fn completed_pickups(&self, bus_id: &BusId) -> FleetResult<Vec<(StudentId, DateTime<Utc>)>> {
        self.require_bus(bus_id)?;
        let students = self.store.students_for_bus(bus_id)?;
        Ok(summary::completed_pickups(bus_id, &students))
    }

    /// Counters for one bus.
    pub fn bus_summary(&self, bus_id: &BusId) -> FleetResult<BusSummary> {
        let bus = self.require_bus(bus_id)?;
        let students = self.store.students_for_bus(bus_id)?;
        let route = self.get_route(bus_id)?;
        Ok(BusSummary::new(&bus, &students, &route))
    }

    /// Counters for every bus.
    pub fn fleet_summary(&self) -> FleetResult<FleetSummary> {
        let students = self.store.list_students()?;
        let mut buses = Vec::new();
        for bus in self.store.list_buses()? {
            let route = self.sequencer.route(&bus.id, || Ok(self.store.students_for_bus(&bus.id)?))?;
            buses.push(BusSummary::new(&bus, &students, &route));
        }
        Ok(FleetSummary { buses })
    }

    /// Display markers for every bus and student.
    pub fn map_markers(&self) -> FleetResult<Vec<MapMarker>> {
        let buses = self.store.list_buses()?;
        let students = self.store.list_students()?;
        Ok(MapMarker::collect(&buses, &students))
    }

    // ---- snapshots ----

    /// Copy of all buses and students.
    pub fn export_snapshot(&self) -> FleetResult<FleetSnapshot> {
        let _w = self.write_guard()?;
        Ok(self.store.snapshot()?)
    }

    /// Replace all state with a snapshot.
    ///
    /// The snapshot is fully checked first; on error nothing changes.
    pub fn import_snapshot(&self, snapshot: &FleetSnapshot) -> FleetResult<()> {
        snapshot.ensure_supported()?;
        for bus in &snapshot.buses {
            validation::validate_bus(bus)?;
        }
        for student in &snapshot.students {
            validation::validate_student(student)?;
        }
        let _w = self.write_guard()?;
        self.store.restore(snapshot)?;
        self.sequencer.invalidate_all()?;
        info!(
            buses = snapshot.buses.len(),
            students = snapshot.students.len(),
            "snapshot imported"
        );
        Ok(())
    }

    // ---- commands ----

    /// Execute a command envelope.
    ///
    /// Arrivals are stamped with the envelope's timestamp.
    pub fn execute(&self, envelope: CommandEnvelope) -> FleetResult<EngineResponse> {
        let CommandEnvelope {
            request_id,
            timestamp,
            operation,
            ..
        } = envelope;
        let name = operation.name();
        if operation.is_mutation() {
            info!(%request_id, op = name, "executing");
        } else {
            debug!(%request_id, op = name, "executing");
        }

        let result = self.dispatch(operation, timestamp);
        if let Err(e) = &result {
            warn!(%request_id, op = name, kind = ?e.kind(), error = %e, "command failed");
        }
        result
    }

    fn dispatch(&self, operation: Operation, now: DateTime<Utc>) -> FleetResult<EngineResponse> {
        Ok(match operation {
            Operation::AddBus(draft) => EngineResponse::Bus(self.add_bus(draft)?),
            Operation::UpdateBus { id, patch } => EngineResponse::Bus(self.update_bus(&id, &patch)?),
            Operation::DeleteBus { id } => EngineResponse::BusDeleted(self.delete_bus(&id)?),
            Operation::AddStudent(draft) => EngineResponse::Student(self.add_student(draft)?),
            Operation::UpdateStudent { id, patch } => {
                EngineResponse::Student(self.update_student(&id, &patch)?)
            }
            Operation::DeleteStudent { id } => {
                EngineResponse::StudentDeleted(self.delete_student(&id)?)
            }
            Operation::TogglePresence { student_id } => {
                let (student, state) =
                    self.transition(&student_id, PresenceAction::TogglePresence, now)?;
                EngineResponse::Presence { student, state }
            }
            Operation::MarkArrived { student_id } => {
                let (student, state) =
                    self.transition(&student_id, PresenceAction::MarkArrived, now)?;
                EngineResponse::Presence { student, state }
            }
            Operation::ResetRun => EngineResponse::RunReset {
                reset: self.reset_run()?,
            },
            Operation::ResetBusRun { bus_id } => EngineResponse::RunReset {
                reset: self.reset_bus_run(&bus_id)?,
            },
            Operation::ImportSnapshot(snapshot) => {
                self.import_snapshot(&snapshot)?;
                EngineResponse::Imported {
                    buses: snapshot.buses.len(),
                    students: snapshot.students.len(),
                }
            }
            Operation::ListBuses => EngineResponse::Buses(self.list_buses()?),
            Operation::ListStudents { bus_id: None } => {
                EngineResponse::Students(self.list_students()?)
            }
            Operation::ListStudents { bus_id: Some(id) } => {
                EngineResponse::Students(self.students_for_bus(&id)?)
            }
            Operation::GetRoute { bus_id } => EngineResponse::Route(self.get_route(&bus_id)?),
            Operation::CompletedPickups { bus_id } => {
                EngineResponse::Pickups(self.completed_pickups(&bus_id)?)
            }
            Operation::FleetSummary => EngineResponse::Summary(self.fleet_summary()?),
            Operation::ExportSnapshot => EngineResponse::Snapshot(self.export_snapshot()?),
        })
    }
}

impl Default for FleetEngine {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for FleetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetEngine")
            .field("config", &self.config)
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{OnceLock, Weak};

    use super::*;

    use crate::error::ErrorKind;
    use crate::geo::Coordinates;

    fn engine() -> FleetEngine {
        let eng = FleetEngine::in_memory();
        eng.add_bus(BusDraft::new("North", "Ann", Coordinates::new(40.0, -74.0)).with_id("bus1"))
            .unwrap();
        eng
    }

    fn add(eng: &FleetEngine, id: &str, bus: &str, present: bool) -> Student {
        eng.add_student(
            StudentDraft::new(format!("Student {id}"), "1 Main", Coordinates::new(40.1, -74.1), bus)
                .with_id(id)
                .present(present),
        )
        .unwrap()
    }

    fn route_ids(route: &Route) -> Vec<&str> {
        route.stops.iter().map(|s| s.student_id.as_str()).collect()
    }

    #[test]
    fn add_student_defaults_to_present() {
        let eng = engine();
        let s = eng
            .add_student(StudentDraft::new("Ada", "1 Main", Coordinates::new(1.0, 1.0), "bus1"))
            .unwrap();
        assert!(s.is_present);

        let eng = FleetEngine::with_config(
            Arc::new(InMemoryFleetStore::new()),
            EngineConfig {
                present_on_create: false,
                ..EngineConfig::default()
            },
        )
        .unwrap();
        eng.add_bus(BusDraft::new("N", "A", Coordinates::new(0.0, 0.0)).with_id("bus1"))
            .unwrap();
        let s = eng
            .add_student(StudentDraft::new("Ada", "1 Main", Coordinates::new(1.0, 1.0), "bus1"))
            .unwrap();
        assert!(!s.is_present);
    }

    #[test]
    fn route_scenario_from_product_rules() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        add(&eng, "B", "bus1", true);
        add(&eng, "C", "bus1", false);

        let bus1 = BusId::from("bus1");
        let route = eng.get_route(&bus1).unwrap();
        assert_eq!(route_ids(&route), ["A", "B"]);
        assert_eq!(route.stops[0].eta_minutes, 5);
        assert_eq!(route.stops[1].eta_minutes, 10);
        assert_eq!(route.stops[1].position, 1);
        assert_eq!(route.total_eta_minutes, 10);

        eng.mark_arrived(&StudentId::from("A")).unwrap();
        let route = eng.get_route(&bus1).unwrap();
        assert_eq!(route_ids(&route), ["B"]);
        assert_eq!(route.stops[0].position, 0);
        assert_eq!(route.stops[0].eta_minutes, 5);
    }

    #[test]
    fn arrived_student_cannot_toggle() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        let id = StudentId::from("A");
        let arrived = eng.mark_arrived(&id).unwrap();
        assert!(arrived.arrived_at.is_some());

        let err = eng.toggle_presence(&id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(eng.student(&id).unwrap().unwrap(), arrived);

        let err = eng.mark_arrived(&id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn mark_arrived_requires_presence() {
        let eng = engine();
        add(&eng, "C", "bus1", false);
        let err = eng.mark_arrived(&StudentId::from("C")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(eng.student(&StudentId::from("C")).unwrap().unwrap().arrived_at.is_none());
    }

    #[test]
    fn delete_bus_guard_reports_dependents() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        add(&eng, "B", "bus1", false);

        let err = eng.delete_bus(&BusId::from("bus1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
        assert!(err.to_string().contains("2 students are assigned"));
        assert_eq!(eng.list_buses().unwrap().len(), 1);

        eng.delete_student(&StudentId::from("A")).unwrap();
        eng.delete_student(&StudentId::from("B")).unwrap();
        eng.delete_bus(&BusId::from("bus1")).unwrap();
        assert!(eng.list_buses().unwrap().is_empty());

        let err = eng.delete_bus(&BusId::from("bus1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn dangling_and_invalid_students_are_rejected() {
        let eng = engine();
        let err = eng
            .add_student(StudentDraft::new("Ada", "1 Main", Coordinates::new(1.0, 1.0), "nonexistent"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DanglingReference);

        let err = eng
            .add_student(StudentDraft::new("Ada", "1 Main", Coordinates::new(f64::NAN, 1.0), "bus1"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(eng.list_students().unwrap().is_empty());
    }

    #[test]
    fn reassignment_invalidates_both_routes() {
        let eng = engine();
        eng.add_bus(BusDraft::new("South", "Bo", Coordinates::new(41.0, -73.0)).with_id("bus2"))
            .unwrap();
        add(&eng, "A", "bus1", true);
        add(&eng, "B", "bus1", true);

        let bus1 = BusId::from("bus1");
        let bus2 = BusId::from("bus2");
        assert_eq!(eng.get_route(&bus1).unwrap().len(), 2);
        assert!(eng.get_route(&bus2).unwrap().is_empty());

        eng.update_student(&StudentId::from("A"), &StudentPatch::reassign("bus2"))
            .unwrap();
        assert_eq!(route_ids(&eng.get_route(&bus1).unwrap()), ["B"]);
        assert_eq!(route_ids(&eng.get_route(&bus2).unwrap()), ["A"]);

        let err = eng
            .update_student(&StudentId::from("A"), &StudentPatch::reassign("ghost"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DanglingReference);
        assert_eq!(eng.student(&StudentId::from("A")).unwrap().unwrap().bus_id, bus2);
    }

    #[test]
    fn reset_run_returns_everyone_to_absent() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        add(&eng, "B", "bus1", true);
        add(&eng, "C", "bus1", false);
        eng.mark_arrived(&StudentId::from("A")).unwrap();

        assert_eq!(eng.reset_run().unwrap(), 2);
        for s in eng.list_students().unwrap() {
            assert_eq!(s.state(), PresenceState::Absent);
        }
        assert!(eng.get_route(&BusId::from("bus1")).unwrap().is_empty());

        eng.toggle_presence(&StudentId::from("A")).unwrap();
        assert_eq!(eng.reset_bus_run(&BusId::from("bus1")).unwrap(), 1);
    }

    #[test]
    fn get_route_is_idempotent_and_tracks_versions() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        let bus1 = BusId::from("bus1");

        let v1 = eng.route_version(&bus1).unwrap();
        assert_eq!(eng.get_route(&bus1).unwrap(), eng.get_route(&bus1).unwrap());

        eng.toggle_presence(&StudentId::from("A")).unwrap();
        assert!(eng.route_version(&bus1).unwrap() > v1);
        assert!(eng.get_route(&bus1).unwrap().is_empty());

        let err = eng.get_route(&BusId::from("nope")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn execute_stamps_arrival_with_envelope_time() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        let at = Utc::now() - chrono::Duration::minutes(30);

        let resp = eng
            .execute(
                CommandEnvelope::new(Operation::MarkArrived {
                    student_id: StudentId::from("A"),
                })
                .at(at),
            )
            .unwrap();
        let EngineResponse::Presence { student, state } = resp else {
            panic!("expected presence response");
        };
        assert_eq!(state, PresenceState::Arrived);
        assert_eq!(student.arrived_at, Some(at));

        let resp = eng
            .execute(Operation::GetRoute { bus_id: BusId::from("bus1") }.into())
            .unwrap();
        assert!(matches!(resp, EngineResponse::Route(r) if r.is_empty()));
    }

    #[test]
    fn zero_stop_interval_is_rejected() {
        let err = FleetEngine::with_config(
            Arc::new(InMemoryFleetStore::new()),
            EngineConfig {
                minutes_per_stop: 0,
                ..EngineConfig::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = FleetEngine::with_strategy(
            Arc::new(InMemoryFleetStore::new()),
            EngineConfig {
                minutes_per_stop: 0,
                ..EngineConfig::default()
            },
            Box::new(FixedIntervalStrategy::default()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    /// Store that lands an import from "another caller" while a route read
    /// is between loading its rows and caching them.
    struct ImportDuringRead {
        inner: InMemoryFleetStore,
        engine: OnceLock<Weak<FleetEngine>>,
        pending: Mutex<Option<FleetSnapshot>>,
    }

    impl FleetStore for ImportDuringRead {
        fn insert_bus(&self, bus: Bus) -> Result<(), StorageError> {
            self.inner.insert_bus(bus)
        }
        fn get_bus(&self, id: &BusId) -> Result<Option<Bus>, StorageError> {
            self.inner.get_bus(id)
        }
        fn update_bus(&self, bus: Bus) -> Result<(), StorageError> {
            self.inner.update_bus(bus)
        }
        fn delete_bus(&self, id: &BusId) -> Result<Bus, StorageError> {
            self.inner.delete_bus(id)
        }
        fn list_buses(&self) -> Result<Vec<Bus>, StorageError> {
            self.inner.list_buses()
        }
        fn insert_student(&self, student: Student) -> Result<(), StorageError> {
            self.inner.insert_student(student)
        }
        fn get_student(&self, id: &StudentId) -> Result<Option<Student>, StorageError> {
            self.inner.get_student(id)
        }
        fn update_student(&self, student: Student) -> Result<(), StorageError> {
            self.inner.update_student(student)
        }
        fn delete_student(&self, id: &StudentId) -> Result<Student, StorageError> {
            self.inner.delete_student(id)
        }
        fn list_students(&self) -> Result<Vec<Student>, StorageError> {
            self.inner.list_students()
        }
        fn students_for_bus(&self, bus_id: &BusId) -> Result<Vec<Student>, StorageError> {
            let rows = self.inner.students_for_bus(bus_id)?;
            let pending = self.pending.lock().unwrap().take();
            if let Some(snapshot) = pending {
                let engine = self.engine.get().and_then(Weak::upgrade).unwrap();
                engine.import_snapshot(&snapshot).unwrap();
            }
            Ok(rows)
        }
        fn reset_presence(&self, bus_id: Option<&BusId>) -> Result<usize, StorageError> {
            self.inner.reset_presence(bus_id)
        }
        fn count_students_for_bus(&self, bus_id: &BusId) -> Result<usize, StorageError> {
            self.inner.count_students_for_bus(bus_id)
        }
        fn snapshot(&self) -> Result<FleetSnapshot, StorageError> {
            self.inner.snapshot()
        }
        fn restore(&self, snapshot: &FleetSnapshot) -> Result<(), StorageError> {
            self.inner.restore(snapshot)
        }
    }

    #[test]
    fn import_racing_a_route_read_is_not_masked_by_the_cache() {
        let store = Arc::new(ImportDuringRead {
            inner: InMemoryFleetStore::new(),
            engine: OnceLock::new(),
            pending: Mutex::new(None),
        });
        let shared: Arc<dyn FleetStore> = store.clone();
        let eng = Arc::new(FleetEngine::new(shared));
        store.engine.set(Arc::downgrade(&eng)).unwrap();

        // Buses that only ever arrived through an import.
        let seeded = FleetSnapshot::new(
            vec![Bus::new("bus1", "North", "Ann", Coordinates::new(40.0, -74.0))],
            vec![Student::new("A", "Ada", "1 Main", Coordinates::new(40.1, -74.1), "bus1").present(true)],
        );
        eng.import_snapshot(&seeded).unwrap();

        let emptied = FleetSnapshot::new(seeded.buses.clone(), Vec::new());
        *store.pending.lock().unwrap() = Some(emptied);

        let bus1 = BusId::from("bus1");
        assert_eq!(eng.get_route(&bus1).unwrap().len(), 1);
        assert!(eng.list_students().unwrap().is_empty());
        assert!(eng.get_route(&bus1).unwrap().is_empty());
    }

    #[test]
    fn import_rejects_records_add_would_reject() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        let before = eng.export_snapshot().unwrap();

        let mut unnamed = before.clone();
        unnamed.students[0].name = "  ".to_string();
        assert!(eng.import_snapshot(&unnamed).unwrap_err().is_validation());

        let mut blank_id = before.clone();
        blank_id.buses[0].id = BusId::from("");
        assert!(eng.import_snapshot(&blank_id).unwrap_err().is_validation());

        let mut future = before.clone();
        future.format_version += 1;
        assert_eq!(eng.import_snapshot(&future).unwrap_err().kind(), ErrorKind::Snapshot);

        assert_eq!(
            eng.export_snapshot().unwrap().fingerprint().unwrap(),
            before.fingerprint().unwrap()
        );
    }

    #[test]
    fn completed_pickups_lists_arrivals_oldest_first() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        add(&eng, "B", "bus1", true);
        add(&eng, "C", "bus1", true);
        let now = Utc::now();
        eng.mark_arrived_at(&StudentId::from("B"), now - chrono::Duration::minutes(10))
            .unwrap();
        eng.mark_arrived_at(&StudentId::from("A"), now).unwrap();

        let done = eng.completed_pickups(&BusId::from("bus1")).unwrap();
        let ids: Vec<&str> = done.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["B", "A"]);

        let resp = eng
            .execute(Operation::CompletedPickups { bus_id: BusId::from("bus1") }.into())
            .unwrap();
        assert_eq!(resp, EngineResponse::Pickups(done));

        let err = eng.completed_pickups(&BusId::from("ghost")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn failed_import_keeps_state() {
        let eng = engine();
        add(&eng, "A", "bus1", true);
        let before = eng.export_snapshot().unwrap();

        let mut bad = before.clone();
        bad.students[0].is_present = false;
        bad.students[0].arrived_at = Some(Utc::now());
        assert!(eng.import_snapshot(&bad).unwrap_err().is_validation());

        let after = eng.export_snapshot().unwrap();
        assert_eq!(before.fingerprint().unwrap(), after.fingerprint().unwrap());
    }
}
