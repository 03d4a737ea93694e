use busroute::{
    read_snapshot_file, write_snapshot_file, BusDraft, BusId, Coordinates, ErrorKind,
    FleetEngine, FleetSnapshot, StudentDraft, StudentId,
};

fn engine_mid_run() -> FleetEngine {
    let engine = FleetEngine::in_memory();
    for (id, name) in [("bus1", "North"), ("bus2", "South")] {
        engine
            .add_bus(BusDraft::new(name, "Driver", Coordinates::new(40.7, -74.0)).with_id(id))
            .unwrap();
    }
    for (i, bus) in ["bus1", "bus2", "bus1", "bus1", "bus2"].into_iter().enumerate() {
        engine
            .add_student(
                StudentDraft::new(
                    format!("Student {i}"),
                    format!("{i} Elm St"),
                    Coordinates::new(40.7 + f64::from(i as u8) * 0.01, -74.0),
                    bus,
                )
                .with_id(format!("s{i}"))
                .present(i != 3),
            )
            .unwrap();
    }
    engine.mark_arrived(&StudentId::from("s0")).unwrap();
    engine
}

fn assert_same_observations(a: &FleetEngine, b: &FleetEngine) {
    assert_eq!(a.list_buses().unwrap(), b.list_buses().unwrap());
    assert_eq!(a.list_students().unwrap(), b.list_students().unwrap());
    for bus in a.list_buses().unwrap() {
        assert_eq!(a.get_route(&bus.id).unwrap(), b.get_route(&bus.id).unwrap());
        assert_eq!(a.students_for_bus(&bus.id).unwrap(), b.students_for_bus(&bus.id).unwrap());
    }
    assert_eq!(a.fleet_summary().unwrap(), b.fleet_summary().unwrap());
}

#[test]
fn export_import_reproduces_engine() {
    let original = engine_mid_run();
    let snapshot = original.export_snapshot().unwrap();

    let restored = FleetEngine::in_memory();
    restored.import_snapshot(&snapshot).unwrap();
    assert_same_observations(&original, &restored);
    assert_eq!(
        snapshot.fingerprint().unwrap(),
        restored.export_snapshot().unwrap().fingerprint().unwrap()
    );
}

#[test]
fn json_and_file_seams_round_trip() {
    let original = engine_mid_run();
    let snapshot = original.export_snapshot().unwrap();

    let from_json = FleetSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
    let restored = FleetEngine::in_memory();
    restored.import_snapshot(&from_json).unwrap();
    assert_same_observations(&original, &restored);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.busr");
    write_snapshot_file(&path, &snapshot).unwrap();
    let from_file = FleetEngine::in_memory();
    from_file.import_snapshot(&read_snapshot_file(&path).unwrap()).unwrap();
    assert_same_observations(&original, &from_file);
}

#[test]
fn import_replaces_state_and_invalidates_routes() {
    let engine = engine_mid_run();
    let bus1 = BusId::from("bus1");
    assert_eq!(engine.get_route(&bus1).unwrap().len(), 1);

    let empty_students = FleetSnapshot::new(engine.list_buses().unwrap(), Vec::new());
    engine.import_snapshot(&empty_students).unwrap();
    assert!(engine.get_route(&bus1).unwrap().is_empty());
    engine.delete_bus(&bus1).unwrap();
}

#[test]
fn dangling_snapshot_is_rejected_whole() {
    let engine = engine_mid_run();
    let before = engine.export_snapshot().unwrap();

    let mut bad = before.clone();
    bad.buses.retain(|b| b.id.as_str() != "bus2");
    let err = engine.import_snapshot(&bad).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DanglingReference);
    assert_eq!(
        engine.export_snapshot().unwrap().fingerprint().unwrap(),
        before.fingerprint().unwrap()
    );
}
