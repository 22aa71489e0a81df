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

//! Connection lifecycle: schema initialization and scoped sessions.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use heliograph_types::DatabaseConfig;

use crate::error::{StorageError, StorageResult};

/// Version of the storage layout created by this build
pub const SCHEMA_VERSION: i64 = 1;

/// Tables this build relies on, with their required columns and primary key
const REQUIRED_TABLES: &[(&str, &[&str], &[&str])] = &[
    ("schema_meta", &["version"], &[]),
    (
        "readings",
        &["subsystem", "ts_ms", "recorded_at", "values_json"],
        &["subsystem", "ts_ms"],
    ),
    ("status", &["key", "value_json", "updated_at"], &["key"]),
];

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS schema_meta (
        version        INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS readings (
        subsystem      TEXT NOT NULL,
        ts_ms          INTEGER NOT NULL,
        recorded_at    TEXT NOT NULL,
        values_json    TEXT NOT NULL,
        PRIMARY KEY (subsystem, ts_ms)
    );

    CREATE INDEX IF NOT EXISTS idx_readings_ts
        ON readings(ts_ms);

    CREATE TABLE IF NOT EXISTS status (
        key            TEXT PRIMARY KEY,
        value_json     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    );";

/// Owns how connections to the SQLite file are made.
///
/// No connection is kept open between operations; every [`Session`] opens its
/// own and closes it when the scope ends.
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
    wal: bool,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    open_sessions: AtomicUsize,
}

impl Database {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            path: PathBuf::from(&config.path),
            busy_timeout: config.busy_timeout(),
            wal: config.wal,
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            open_sessions: AtomicUsize::new(0),
        }
    }

    /// Database at `path` with default connection settings
    pub fn at(path: impl AsRef<Path>) -> Self {
        let config = DatabaseConfig {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        };
        Self::new(&config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Create the storage structures if missing and check existing ones.
    ///
    /// Safe to call any number of times.
    pub fn init_db(&self) -> StorageResult<()> {
        let _guard = self.init_lock.lock();

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Init(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let mut conn = self.connect().map_err(|e| {
            StorageError::Init(format!(
                "failed to open database {}: {e}",
                self.path.display()
            ))
        })?;

        if self.wal {
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(init_failed("failed to enable WAL"))?;
            debug!(mode = %mode, "Journal mode set");
        }

        let version = prepare_schema(&mut conn)?;
        let first = !self.initialized.swap(true, Ordering::AcqRel);

        if first {
            info!(
                path = %self.path.display(),
                version,
                "🗄️ Database initialized"
            );
        }
        Ok(())
    }

    /// Run `f` inside one unit of work.
    ///
    /// The session is committed if `f` returns `Ok`, rolled back if it returns
    /// `Err` or unwinds, and its connection is closed before this returns.
    pub fn with_session<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Session<'_>) -> StorageResult<T>,
    {
        if !self.is_initialized() {
            return Err(StorageError::NotInitialized);
        }

        let _open = OpenSession::register(&self.open_sessions);
        let mut conn = self.connect()?;
        let session = Session {
            tx: conn.transaction()?,
        };

        match f(&session) {
            Ok(value) => {
                session.tx.commit()?;
                debug!("Session committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = session.tx.rollback() {
                    warn!("Session rollback failed: {rollback}");
                }
                debug!("Session rolled back: {e}");
                Err(e)
            }
        }
    }

    /// Stored layout version
    pub fn schema_version(&self) -> StorageResult<Option<i64>> {
        self.with_session(|session| Ok(stored_version(session.connection())?))
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }
}

/// One unit of work against storage
#[derive(Debug)]
pub struct Session<'conn> {
    tx: Transaction<'conn>,
}

impl Session<'_> {
    pub fn connection(&self) -> &Connection {
        &self.tx
    }
}

/// Counts a session as open until dropped
#[derive(Debug)]
struct OpenSession<'a>(&'a AtomicUsize);

impl<'a> OpenSession<'a> {
    fn register(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for OpenSession<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn init_failed(context: &'static str) -> impl Fn(rusqlite::Error) -> StorageError {
    move |e| StorageError::Init(format!("{context}: {e}"))
}

/// Check existing structures, create missing ones and record the version
fn prepare_schema(conn: &mut Connection) -> StorageResult<i64> {
    let tx = conn
        .transaction()
        .map_err(init_failed("failed to begin schema transaction"))?;

    for (table, columns, primary_key) in REQUIRED_TABLES {
        check_structure(&tx, table, columns, primary_key)?;
    }

    let stored = stored_version(&tx).map_err(init_failed("failed to read schema version"))?;
    if let Some(version) = stored
        && version > SCHEMA_VERSION
    {
        return Err(StorageError::Init(format!(
            "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    tx.execute_batch(CREATE_TABLES)
        .map_err(init_failed("failed to create tables"))?;

    if stored.is_none() {
        tx.execute(
            "INSERT INTO schema_meta (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )
        .map_err(init_failed("failed to record schema version"))?;
    }

    tx.commit()
        .map_err(init_failed("failed to commit schema"))?;
    Ok(stored.unwrap_or(SCHEMA_VERSION))
}

fn object_type(conn: &Connection, name: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT type FROM sqlite_master WHERE name = ?1",
        [name],
        |row| row.get(0),
    )
    .optional()
}

/// An existing object named like one of ours must be a compatible table
fn check_structure(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    primary_key: &[&str],
) -> StorageResult<()> {
    let kind = object_type(conn, table).map_err(init_failed("failed to inspect schema"))?;
    match kind.as_deref() {
        None => return Ok(()),
        Some("table") => {}
        Some(other) => {
            return Err(StorageError::Init(format!(
                "`{table}` exists as a {other}, expected a table"
            )));
        }
    }

    let mut stmt = conn
        .prepare("SELECT name, pk FROM pragma_table_info(?1)")
        .map_err(init_failed("failed to inspect table"))?;
    let existing = stmt
        .query_map([table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(init_failed("failed to inspect table"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(init_failed("failed to inspect table"))?;

    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|column| !existing.iter().any(|(name, _)| name == column))
        .collect();
    if !missing.is_empty() {
        return Err(StorageError::Init(format!(
            "table `{table}` is missing columns: {}",
            missing.join(", ")
        )));
    }

    let key_matches = primary_key.iter().all(|column| {
        existing
            .iter()
            .any(|(name, pk)| name == column && *pk > 0)
    });
    if !key_matches {
        return Err(StorageError::Init(format!(
            "table `{table}` must have primary key ({})",
            primary_key.join(", ")
        )));
    }

    Ok(())
}

fn stored_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    if object_type(conn, "schema_meta")?.is_none() {
        return Ok(None);
    }
    conn.query_row("SELECT MAX(version) FROM schema_meta", [], |row| row.get(0))
}
