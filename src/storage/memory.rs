//! In-memory storage backend.
//!
//! Thread-safe, order-preserving implementation of [`FleetStore`]. Records
//! live in vectors (insertion order is route order) with id → position
//! indexes beside them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use crate::bus::{Bus, BusId};
use crate::presence;
use crate::snapshot::FleetSnapshot;
use crate::storage::traits::{FleetStore, RecordKind, StorageError};
use crate::student::{Student, StudentId};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Ordered collection with an id index.
#[derive(Debug)]
struct Table<K, V> {
    rows: Vec<V>,
    index: HashMap<K, usize>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash, V> Table<K, V> {
    fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&pos| &self.rows[pos])
    }

    fn push(&mut self, key: K, row: V) {
        self.index.insert(key, self.rows.len());
        self.rows.push(row);
    }

    fn replace(&mut self, key: &K, row: V) -> bool {
        match self.index.get(key) {
            Some(&pos) => {
                self.rows[pos] = row;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, key: &K, key_of: impl Fn(&V) -> K) -> Option<V> {
        let pos = self.index.remove(key)?;
        let row = self.rows.remove(pos);
        for (offset, shifted) in self.rows[pos..].iter().enumerate() {
            self.index.insert(key_of(shifted), pos + offset);
        }
        Some(row)
    }
}

#[derive(Debug, Default)]
struct FleetState {
    buses: Table<BusId, Bus>,
    students: Table<StudentId, Student>,
}

impl FleetState {
    fn check_bus_ref(&self, student: &Student) -> Result<(), StorageError> {
        if self.buses.contains(&student.bus_id) {
            Ok(())
        } else {
            Err(StorageError::DanglingReference {
                student_id: student.id.clone(),
                bus_id: student.bus_id.clone(),
            })
        }
    }

    fn dependents(&self, bus_id: &BusId) -> usize {
        self.students
            .rows
            .iter()
            .filter(|s| &s.bus_id == bus_id)
            .count()
    }

    fn from_snapshot(snapshot: &FleetSnapshot) -> Result<Self, StorageError> {
        let mut state = Self::default();
        for bus in &snapshot.buses {
            if state.buses.contains(&bus.id) {
                return Err(StorageError::DuplicateId {
                    kind: RecordKind::Bus,
                    id: bus.id.to_string(),
                });
            }
            state.buses.push(bus.id.clone(), bus.clone());
        }
        for student in &snapshot.students {
            if state.students.contains(&student.id) {
                return Err(StorageError::DuplicateId {
                    kind: RecordKind::Student,
                    id: student.id.to_string(),
                });
            }
            state.check_bus_ref(student)?;
            state.students.push(student.id.clone(), student.clone());
        }
        Ok(state)
    }
}

/// Thread-safe in-memory fleet store.
#[derive(Debug, Default)]
pub struct InMemoryFleetStore {
    state: RwLock<FleetState>,
}

impl InMemoryFleetStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FleetStore for InMemoryFleetStore {
    fn insert_bus(&self, bus: Bus) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("bus.insert"))?;
        if state.buses.contains(&bus.id) {
            return Err(StorageError::DuplicateId {
                kind: RecordKind::Bus,
                id: bus.id.to_string(),
            });
        }
        state.buses.push(bus.id.clone(), bus);
        Ok(())
    }

    fn get_bus(&self, id: &BusId) -> Result<Option<Bus>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("bus.get"))?;
        Ok(state.buses.get(id).cloned())
    }

    fn update_bus(&self, bus: Bus) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("bus.update"))?;
        let id = bus.id.clone();
        if state.buses.replace(&id, bus) {
            Ok(())
        } else {
            Err(StorageError::bus_not_found(&id))
        }
    }

    fn delete_bus(&self, id: &BusId) -> Result<Bus, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("bus.delete"))?;
        if !state.buses.contains(id) {
            return Err(StorageError::bus_not_found(id));
        }
        let dependents = state.dependents(id);
        if dependents > 0 {
            return Err(StorageError::ReferentialIntegrity {
                bus_id: id.clone(),
                dependents,
            });
        }
        state
            .buses
            .remove(id, |b| b.id.clone())
            .ok_or_else(|| StorageError::bus_not_found(id))
    }

    fn list_buses(&self) -> Result<Vec<Bus>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("bus.list"))?;
        Ok(state.buses.rows.clone())
    }

    fn insert_student(&self, student: Student) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("student.insert"))?;
        if state.students.contains(&student.id) {
            return Err(StorageError::DuplicateId {
                kind: RecordKind::Student,
                id: student.id.to_string(),
            });
        }
        state.check_bus_ref(&student)?;
        state.students.push(student.id.clone(), student);
        Ok(())
    }

    fn get_student(&self, id: &StudentId) -> Result<Option<Student>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("student.get"))?;
        Ok(state.students.get(id).cloned())
    }

    fn update_student(&self, student: Student) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("student.update"))?;
        if !state.students.contains(&student.id) {
            return Err(StorageError::student_not_found(&student.id));
        }
        state.check_bus_ref(&student)?;
        let id = student.id.clone();
        state.students.replace(&id, student);
        Ok(())
    }

    fn delete_student(&self, id: &StudentId) -> Result<Student, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("student.delete"))?;
        state
            .students
            .remove(id, |s| s.id.clone())
            .ok_or_else(|| StorageError::student_not_found(id))
    }

    fn list_students(&self) -> Result<Vec<Student>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("student.list"))?;
        Ok(state.students.rows.clone())
    }

    fn students_for_bus(&self, bus_id: &BusId) -> Result<Vec<Student>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("student.by_bus"))?;
        Ok(state
            .students
            .rows
            .iter()
            .filter(|s| &s.bus_id == bus_id)
            .cloned()
            .collect())
    }

    fn reset_presence(&self, bus_id: Option<&BusId>) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("student.reset"))?;
        if let Some(id) = bus_id {
            if !state.buses.contains(id) {
                return Err(StorageError::bus_not_found(id));
            }
        }
        Ok(state
            .students
            .rows
            .iter_mut()
            .filter(|s| bus_id.map_or(true, |id| &s.bus_id == id))
            .map(presence::reset)
            .filter(|&changed| changed)
            .count())
    }

    fn count_students_for_bus(&self, bus_id: &BusId) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("student.count"))?;
        Ok(state.dependents(bus_id))
    }

    fn snapshot(&self) -> Result<FleetSnapshot, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("snapshot"))?;
        Ok(FleetSnapshot::new(
            state.buses.rows.clone(),
            state.students.rows.clone(),
        ))
    }

    fn restore(&self, snapshot: &FleetSnapshot) -> Result<(), StorageError> {
        let fresh = FleetState::from_snapshot(snapshot)?;
        let mut state = self.state.write().map_err(|_| lock_err("restore"))?;
        *state = fresh;
        Ok(())
    }
}
