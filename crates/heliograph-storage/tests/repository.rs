// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Heliograph.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Integration tests for the database engine and telemetry repository

use chrono::{DateTime, Duration, TimeZone, Utc};
use heliograph_config::{ConfigManager, ManagerOptions};
use heliograph_storage::{
    Database, RecordOutcome, Reading, SqliteRepository, StorageError, TelemetryRepository,
};
use heliograph_types::{DatabaseConfig, DuplicatePolicy};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Test helpers
// ============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("heliograph.db").to_string_lossy().into_owned(),
        ..DatabaseConfig::default()
    }
}

fn setup() -> (SqliteRepository, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let db = Arc::new(Database::new(&config));
    db.init_db().unwrap();
    (SqliteRepository::new(db, &config), dir)
}

fn reading(subsystem: &str, minutes: i64, power: f64) -> Reading {
    Reading::new(subsystem, t0() + Duration::minutes(minutes)).with_value("power_w", power)
}

// ============================================================================
// record
// ============================================================================

#[test]
fn duplicate_reading_rejected_and_stored_once() {
    let (repo, _dir) = setup();
    let first = reading("solar", 0, 1500.0);
    let second = reading("solar", 0, 9999.0);

    assert_eq!(repo.record(&first).unwrap(), RecordOutcome::Inserted);
    let error = repo.record(&second).unwrap_err();

    assert!(matches!(
        error,
        StorageError::DuplicateKey { ref subsystem, timestamp }
            if subsystem == "solar" && timestamp == t0()
    ));
    assert_eq!(repo.count("solar").unwrap(), 1);
    let stored = repo.latest("solar").unwrap().unwrap();
    assert_eq!(stored.value("power_w"), Some(1500.0));
}

#[test]
fn duplicate_reading_ignored_under_ignore_policy() {
    let (repo, _dir) = setup();
    let repo = repo.with_duplicate_policy(DuplicatePolicy::Ignore);

    assert_eq!(
        repo.record(&reading("battery", 5, 100.0)).unwrap(),
        RecordOutcome::Inserted
    );
    assert_eq!(
        repo.record(&reading("battery", 5, 200.0)).unwrap(),
        RecordOutcome::AlreadyPresent
    );
    assert_eq!(repo.count("battery").unwrap(), 1);
    assert_eq!(
        repo.latest("battery").unwrap().unwrap().value("power_w"),
        Some(100.0)
    );
}

#[test]
fn same_timestamp_in_different_subsystems_is_not_a_duplicate() {
    let (repo, _dir) = setup();
    repo.record(&reading("solar", 0, 1.0)).unwrap();
    repo.record(&reading("grid", 0, 2.0)).unwrap();

    assert_eq!(repo.count("solar").unwrap(), 1);
    assert_eq!(repo.count("grid").unwrap(), 1);
}

#[test]
fn invalid_reading_is_rejected_before_storage() {
    let (repo, _dir) = setup();
    let bad = reading("solar", 0, f64::INFINITY);

    assert!(matches!(
        repo.record(&bad),
        Err(StorageError::InvalidRecord(_))
    ));
    assert_eq!(repo.count("solar").unwrap(), 0);
}

// ============================================================================
// query_range
// ============================================================================

#[test]
fn empty_interval_yields_empty_sequence() {
    let (repo, _dir) = setup();
    repo.record(&reading("grid", 0, 1.0)).unwrap();

    let range = repo.query_range("grid", t0(), t0()).unwrap();
    assert_eq!(range.iter().count(), 0);

    let inverted = repo
        .query_range("grid", t0() + Duration::hours(1), t0())
        .unwrap();
    assert!(inverted.collect_all().unwrap().is_empty());
}

#[test]
fn range_is_half_open_filtered_and_ascending() {
    let (repo, _dir) = setup();
    // inserted out of order
    for minutes in [30, 0, 10, 50, 20, 40] {
        repo.record(&reading("solar", minutes, f64::from(u32::try_from(minutes).unwrap())))
            .unwrap();
    }
    repo.record(&reading("grid", 20, -1.0)).unwrap();

    let readings = repo
        .query_range("solar", t0() + Duration::minutes(10), t0() + Duration::minutes(40))
        .unwrap()
        .collect_all()
        .unwrap();

    let minutes: Vec<f64> = readings.iter().map(|r| r.value("power_w").unwrap()).collect();
    assert_eq!(minutes, vec![10.0, 20.0, 30.0]);
    assert!(readings.iter().all(|r| r.subsystem == "solar"));
    assert!(readings.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
}

#[test]
fn decoded_sub_millisecond_reading_is_found_from_its_own_timestamp() {
    let (repo, _dir) = setup();
    let decoded: Reading = serde_json::from_value(json!({
        "subsystem": "solar",
        "timestamp": "2025-06-01T00:00:00.000500Z",
        "values": { "power_w": 1500.0 },
    }))
    .unwrap();
    let neighbour: Reading = serde_json::from_value(json!({
        "subsystem": "solar",
        "timestamp": "2025-06-01T00:00:00.000900Z",
        "values": { "power_w": 1600.0 },
    }))
    .unwrap();

    assert_eq!(decoded.timestamp(), t0());
    repo.record(&decoded).unwrap();

    let start = decoded.timestamp();
    let found = repo
        .query_range("solar", start, start + Duration::seconds(1))
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(found, vec![decoded]);

    // same millisecond, same identity
    assert!(matches!(
        repo.record(&neighbour),
        Err(StorageError::DuplicateKey { timestamp, .. }) if timestamp == t0()
    ));
}

#[test]
fn paged_iteration_matches_single_page_and_restarts() {
    let (repo, _dir) = setup();
    for minutes in 0..25 {
        repo.record(&reading("battery", minutes, 1.0)).unwrap();
    }
    let start = t0() + Duration::minutes(3);
    let end = t0() + Duration::minutes(21);

    let single = repo.query_range("battery", start, end).unwrap().collect_all().unwrap();
    let paged_repo = repo.clone().with_page_size(4);
    let paged = paged_repo.query_range("battery", start, end).unwrap();

    let first_pass = paged.collect_all().unwrap();
    let second_pass: Vec<Reading> = paged.iter().map(Result::unwrap).collect();

    assert_eq!(single.len(), 18);
    assert_eq!(first_pass, single);
    assert_eq!(second_pass, single);
}

#[test]
fn range_sees_writes_made_between_passes() {
    let (repo, _dir) = setup();
    repo.record(&reading("solar", 1, 1.0)).unwrap();
    let range = repo
        .query_range("solar", t0(), t0() + Duration::hours(1))
        .unwrap();
    assert_eq!(range.iter().count(), 1);

    repo.record(&reading("solar", 2, 2.0)).unwrap();
    assert_eq!(range.iter().count(), 2);
}

#[test]
fn abandoned_iteration_leaks_no_session() {
    let (repo, _dir) = setup();
    for minutes in 0..10 {
        repo.record(&reading("grid", minutes, 1.0)).unwrap();
    }
    let paged = repo.clone().with_page_size(3);

    let mut iter = paged
        .query_range("grid", t0(), t0() + Duration::hours(1))
        .unwrap()
        .into_iter();
    iter.next().unwrap().unwrap();
    drop(iter);

    assert_eq!(repo.database().open_sessions(), 0);
}

// ============================================================================
// status
// ============================================================================

#[test]
fn upsert_status_inserts_then_replaces() {
    let (repo, _dir) = setup();

    repo.upsert_status("inverter.mode", &json!("self_use")).unwrap();
    let first = repo.status("inverter.mode").unwrap().unwrap();

    repo.upsert_status("inverter.mode", &json!({"mode": "backup", "soc": 80}))
        .unwrap();
    let second = repo.status("inverter.mode").unwrap().unwrap();

    assert_eq!(first.value, json!("self_use"));
    assert_eq!(second.value, json!({"mode": "backup", "soc": 80}));
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(repo.list_status().unwrap().len(), 1);
    assert!(repo.status("missing").unwrap().is_none());
}

#[test]
fn list_status_is_ordered_by_key() {
    let (repo, _dir) = setup();
    repo.upsert_status("b", &json!(2)).unwrap();
    repo.upsert_status("a", &json!(1)).unwrap();

    let keys: Vec<_> = repo.list_status().unwrap().into_iter().map(|e| e.key).collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[test]
fn empty_status_key_rejected() {
    let (repo, _dir) = setup();
    assert!(matches!(
        repo.upsert_status(" ", &json!(true)),
        Err(StorageError::InvalidRecord(_))
    ));
}

// ============================================================================
// retention
// ============================================================================

#[test]
fn purge_before_removes_only_older_readings() {
    let (repo, _dir) = setup();
    for minutes in [0, 10, 20] {
        repo.record(&reading("solar", minutes, 1.0)).unwrap();
    }
    repo.record(&reading("grid", 5, 1.0)).unwrap();

    let deleted = repo.purge_before(t0() + Duration::minutes(10)).unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(repo.count("solar").unwrap(), 2);
    assert_eq!(repo.count("grid").unwrap(), 0);
}

#[test]
fn purge_expired_uses_retention_days() {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        retention_days: 7,
        ..config(&dir)
    };
    let db = Arc::new(Database::new(&config));
    db.init_db().unwrap();
    let repo = SqliteRepository::new(db, &config);

    repo.record(&reading("solar", 0, 1.0)).unwrap();
    let recent = Reading::new("solar", t0() + Duration::days(8)).with_value("power_w", 2.0);
    repo.record(&recent).unwrap();

    let deleted = repo.purge_expired(t0() + Duration::days(10)).unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(repo.latest("solar").unwrap().unwrap(), recent);
}

// ============================================================================
// Engine lifecycle
// ============================================================================

#[test]
fn operations_before_init_fail_then_succeed() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let db = Arc::new(Database::new(&config));
    let repo = SqliteRepository::new(Arc::clone(&db), &config);
    let sample = reading("solar", 0, 1.0);

    assert!(matches!(repo.record(&sample), Err(StorageError::NotInitialized)));
    assert!(matches!(
        repo.query_range("solar", t0(), t0() + Duration::hours(1)),
        Err(StorageError::NotInitialized)
    ));
    assert!(matches!(
        repo.upsert_status("k", &json!(1)),
        Err(StorageError::NotInitialized)
    ));

    db.init_db().unwrap();

    assert_eq!(repo.record(&sample).unwrap(), RecordOutcome::Inserted);
}

#[test]
fn data_survives_reopening() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    {
        let db = Arc::new(Database::new(&config));
        db.init_db().unwrap();
        let repo = SqliteRepository::new(db, &config);
        repo.record(&reading("solar", 0, 42.0)).unwrap();
    }

    let db = Arc::new(Database::new(&config));
    db.init_db().unwrap();
    let repo = SqliteRepository::new(db, &config);
    assert_eq!(
        repo.latest("solar").unwrap().unwrap().value("power_w"),
        Some(42.0)
    );
}

#[test]
fn conflicting_readings_table_fails_init() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    {
        let conn = rusqlite_connection(&config.path);
        conn.execute_batch("CREATE TABLE readings (id INTEGER PRIMARY KEY, payload TEXT);")
            .unwrap();
    }

    let db = Database::new(&config);
    let error = db.init_db().unwrap_err();

    assert!(matches!(error, StorageError::Init(_)));
    assert!(error.to_string().contains("readings"));
    assert!(!db.is_initialized());
}

#[test]
fn view_in_place_of_status_table_fails_init() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    {
        let conn = rusqlite_connection(&config.path);
        conn.execute_batch("CREATE VIEW status AS SELECT 1 AS key;")
            .unwrap();
    }

    let error = Database::new(&config).init_db().unwrap_err();
    assert!(error.to_string().contains("expected a table"));
}

#[test]
fn concurrent_writers_use_independent_sessions() {
    let (repo, _dir) = setup();

    std::thread::scope(|scope| {
        for worker in 0..4_i64 {
            let repo = &repo;
            scope.spawn(move || {
                for i in 0..25 {
                    repo.record(&reading("solar", worker * 100 + i, 1.0)).unwrap();
                }
            });
        }
    });

    assert_eq!(repo.count("solar").unwrap(), 100);
    assert_eq!(repo.database().open_sessions(), 0);
}

// ============================================================================
// End to end with the configuration manager
// ============================================================================

#[test]
fn repository_built_from_loaded_config() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("data").join("from-env.db");
    let config_path = dir.path().join("heliograph.toml");
    std::fs::write(&config_path, "[database]\nduplicate_policy = \"ignore\"\npage_size = 2\n")
        .unwrap();

    let mut env = HashMap::new();
    env.insert(
        "DATABASE_PATH".to_owned(),
        db_path.to_string_lossy().into_owned(),
    );
    let manager = ConfigManager::with_env(ManagerOptions::new(config_path), env);
    let app = manager.load().unwrap();

    let db = Arc::new(Database::new(&app.database));
    db.init_db().unwrap();
    let repo = SqliteRepository::new(db, &app.database);

    repo.record(&reading("solar", 0, 1.0)).unwrap();
    assert_eq!(
        repo.record(&reading("solar", 0, 1.0)).unwrap(),
        RecordOutcome::AlreadyPresent
    );
    for minutes in 1..5 {
        repo.record(&reading("solar", minutes, 1.0)).unwrap();
    }
    let all = repo
        .query_range("solar", t0(), t0() + Duration::hours(1))
        .unwrap()
        .collect_all()
        .unwrap();

    assert_eq!(all.len(), 5);
    assert!(db_path.exists());
}

fn rusqlite_connection(path: &str) -> rusqlite::Connection {
    rusqlite::Connection::open(path).unwrap()
}
