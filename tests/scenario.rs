use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowtrack::{
    engine::FeedMode,
    history::{DensityHistory, HistoryEntry},
    scenario::{Scenario, ScenarioLoader},
    scheduler::TickScheduler,
};
use tempfile::tempdir;

fn loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn festival_file_matches_builtin_layout() {
    let scenario = loader()
        .load("scenarios/festival_grounds.yaml")
        .expect("scenario should load");
    let builtin = Scenario::festival_grounds();

    assert_eq!(scenario.zones, builtin.zones);
    assert_eq!(scenario.flow, builtin.flow);
    assert_eq!(scenario.estimator, builtin.estimator);
    assert_eq!(scenario.total_population, 25_000);
    assert_eq!(scenario.cadence(), Duration::from_secs(1));
}

#[test]
fn festival_run_exports_bounded_history() {
    let scenario = loader().load("scenarios/festival_grounds.yaml").unwrap();
    let mut engine = scenario.engine_builder().build().unwrap();
    let history = Arc::new(Mutex::new(DensityHistory::new(scenario.history_len)));
    let sink = history.clone();
    engine.subscribe(move |snapshot| sink.lock().unwrap().record(snapshot));

    let mut scheduler = TickScheduler::new(scenario.cadence());
    let last = scheduler.run_virtual(&mut engine, 90).unwrap();
    assert_eq!(last.total_people(), 25_000);
    assert_eq!(last.zones.len(), 5);

    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("history.json");
    history.lock().unwrap().write_json(&path).unwrap();

    let rows: Vec<HistoryEntry> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(rows.len(), 60);
    assert_eq!(rows.first().unwrap().tick, 31);
    assert_eq!(rows.last().unwrap().tick, 90);
    assert!(rows.iter().all(|row| row.densities.len() == 5));
}

#[test]
fn camera_gates_wait_for_observations() {
    let scenario = loader().load("scenarios/camera_gates.yaml").unwrap();
    assert_eq!(scenario.feed, FeedMode::External);

    let mut engine = scenario.engine_builder().build().unwrap();
    assert!(engine.snapshot().is_none());

    let empty = engine.tick(Duration::from_secs(1));
    assert!(empty.zones.is_empty());

    engine
        .report_observation("G2", 45, Duration::from_millis(1_400))
        .unwrap();
    let snapshot = engine.tick(Duration::from_secs(2));
    assert_eq!(snapshot.zones.len(), 1);
    assert_eq!(snapshot.zone("G2").unwrap().people, 45);
    assert!(engine
        .report_observation("G3", 1, Duration::from_secs(2))
        .is_err());
}

#[test]
fn invalid_zone_file_fails_to_build() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("broken.yaml"),
        "name: broken\nseed: 1\ntotal_population: 10\nzones:\n  - { key: A, name: A, area_sqm: 0, weight: 1 }\n",
    )
    .unwrap();

    let scenario = ScenarioLoader::new(temp.path()).load("broken.yaml").unwrap();
    assert!(scenario.engine_builder().build().is_err());
}

#[test]
fn oversized_surge_is_rejected_at_build() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("stampede.yaml"),
        "name: stampede\nseed: 1\ntotal_population: 25000\nflow:\n  surge_probability: 1.0\n  surge_min: 1000000000\n  surge_max: 1000000001\nzones:\n  - { key: A, name: A, area_sqm: 100, weight: 1 }\n  - { key: B, name: B, area_sqm: 100, weight: 1 }\n",
    )
    .unwrap();

    let scenario = ScenarioLoader::new(temp.path()).load("stampede.yaml").unwrap();
    let err = scenario.engine_builder().build().err().expect("surge cap enforced");
    assert!(err.to_string().contains("surge_max"));
}
