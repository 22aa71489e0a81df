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

use chrono::{DateTime, Duration, Utc};
use rusqlite::{OptionalExtension, params};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use heliograph_types::{DatabaseConfig, DuplicatePolicy};

use crate::engine::{Database, Session};
use crate::error::{StorageError, StorageResult};
use crate::reading::{Reading, RecordOutcome, StatusEntry, ceil_millis};

/// Data access for telemetry and status.
///
/// Every call acquires its own session and releases it before returning, so
/// implementations hold no per-caller state and can be shared freely.
pub trait TelemetryRepository: Send + Sync {
    /// Append one reading; duplicates are handled per the configured policy
    fn record(&self, reading: &Reading) -> StorageResult<RecordOutcome>;

    /// Readings of `subsystem` with `start <= timestamp < end`, oldest first
    fn query_range(
        &self,
        subsystem: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<ReadingRange>;

    /// Insert or replace a status row
    fn upsert_status(&self, key: &str, value: &serde_json::Value) -> StorageResult<()>;

    fn status(&self, key: &str) -> StorageResult<Option<StatusEntry>>;

    /// All status rows ordered by key
    fn list_status(&self) -> StorageResult<Vec<StatusEntry>>;

    /// Most recent reading of `subsystem`
    fn latest(&self, subsystem: &str) -> StorageResult<Option<Reading>>;

    fn count(&self, subsystem: &str) -> StorageResult<u64>;

    /// Delete readings of every subsystem older than `cutoff`
    fn purge_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}

/// Fetches one page of a range query
pub trait PageReader: Send + Sync + fmt::Debug {
    /// Up to `limit` readings with `from_ms <= ts < end_ms`, ascending
    fn read_page(
        &self,
        subsystem: &str,
        from_ms: i64,
        end_ms: i64,
        limit: u32,
    ) -> StorageResult<Vec<Reading>>;
}

/// A lazy, restartable range of readings.
///
/// Nothing is read until iteration starts. Each iteration starts over from the
/// beginning of the range and reads it page by page, one session per page.
#[derive(Debug, Clone)]
pub struct ReadingRange {
    reader: Option<Arc<dyn PageReader>>,
    subsystem: String,
    start_ms: i64,
    end_ms: i64,
    page_size: u32,
}

impl ReadingRange {
    pub fn new(
        reader: Arc<dyn PageReader>,
        subsystem: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page_size: u32,
    ) -> Self {
        Self {
            reader: Some(reader),
            subsystem: subsystem.into(),
            start_ms: ceil_millis(start),
            end_ms: ceil_millis(end),
            page_size: page_size.max(1),
        }
    }

    /// A range that yields nothing
    pub fn empty(subsystem: impl Into<String>) -> Self {
        Self {
            reader: None,
            subsystem: subsystem.into(),
            start_ms: 0,
            end_ms: 0,
            page_size: 1,
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    /// True when the interval itself is empty; no storage access
    pub fn is_empty_interval(&self) -> bool {
        self.reader.is_none() || self.start_ms >= self.end_ms
    }

    pub fn iter(&self) -> RangeIter {
        RangeIter {
            next_from: self.start_ms,
            range: self.clone(),
            buffer: VecDeque::new(),
            exhausted: self.is_empty_interval(),
        }
    }

    /// Read the whole range
    pub fn collect_all(&self) -> StorageResult<Vec<Reading>> {
        self.iter().collect()
    }
}

impl IntoIterator for ReadingRange {
    type Item = StorageResult<Reading>;
    type IntoIter = RangeIter;

    fn into_iter(self) -> RangeIter {
        self.iter()
    }
}

impl IntoIterator for &ReadingRange {
    type Item = StorageResult<Reading>;
    type IntoIter = RangeIter;

    fn into_iter(self) -> RangeIter {
        self.iter()
    }
}

/// One pass over a [`ReadingRange`]
#[derive(Debug)]
pub struct RangeIter {
    range: ReadingRange,
    next_from: i64,
    buffer: VecDeque<Reading>,
    exhausted: bool,
}

impl Iterator for RangeIter {
    type Item = StorageResult<Reading>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(reading) = self.buffer.pop_front() {
            return Some(Ok(reading));
        }
        if self.exhausted || self.next_from >= self.range.end_ms {
            self.exhausted = true;
            return None;
        }
        let reader = self.range.reader.as_ref()?;

        let page = match reader.read_page(
            &self.range.subsystem,
            self.next_from,
            self.range.end_ms,
            self.range.page_size,
        ) {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Some(Err(e));
            }
        };

        if page.len() < self.range.page_size as usize {
            self.exhausted = true;
        }
        match page.last() {
            // keyset: timestamps are unique per subsystem
            Some(last) => self.next_from = last.timestamp_ms() + 1,
            None => self.exhausted = true,
        }
        self.buffer.extend(page);
        self.buffer.pop_front().map(Ok)
    }
}

/// SQLite implementation of [`TelemetryRepository`]
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db: Arc<Database>,
    duplicates: DuplicatePolicy,
    page_size: u32,
    retention_days: u32,
}

impl SqliteRepository {
    pub fn new(db: Arc<Database>, config: &DatabaseConfig) -> Self {
        Self {
            db,
            duplicates: config.duplicate_policy,
            page_size: config.page_size,
            retention_days: config.retention_days,
        }
    }

    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Apply `database.retention_days` relative to `now`
    pub fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let cutoff = now - Duration::days(i64::from(self.retention_days));
        let deleted = self.purge_before(cutoff)?;
        if deleted > 0 {
            info!(deleted, retention_days = self.retention_days, "🧹 Purged old readings");
        }
        Ok(deleted)
    }
}

impl TelemetryRepository for SqliteRepository {
    fn record(&self, reading: &Reading) -> StorageResult<RecordOutcome> {
        reading.validate()?;
        let values_json = serde_json::to_string(&reading.values)?;
        let ts_ms = reading.timestamp_ms();

        self.db.with_session(|session| {
            let inserted = session.connection().execute(
                "INSERT OR IGNORE INTO readings (subsystem, ts_ms, recorded_at, values_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![reading.subsystem, ts_ms, Utc::now(), values_json],
            )?;
            if inserted == 1 {
                return Ok(RecordOutcome::Inserted);
            }

            match self.duplicates {
                DuplicatePolicy::Reject => Err(StorageError::DuplicateKey {
                    subsystem: reading.subsystem.clone(),
                    timestamp: reading.timestamp,
                }),
                DuplicatePolicy::Ignore => {
                    debug!(subsystem = %reading.subsystem, ts_ms, "Duplicate reading ignored");
                    Ok(RecordOutcome::AlreadyPresent)
                }
            }
        })
    }

    fn query_range(
        &self,
        subsystem: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<ReadingRange> {
        if !self.db.is_initialized() {
            return Err(StorageError::NotInitialized);
        }
        if start >= end {
            return Ok(ReadingRange::empty(subsystem));
        }

        let reader: Arc<dyn PageReader> = Arc::new(SqlitePages {
            db: Arc::clone(&self.db),
        });
        Ok(ReadingRange::new(reader, subsystem, start, end, self.page_size))
    }

    fn upsert_status(&self, key: &str, value: &serde_json::Value) -> StorageResult<()> {
        if key.trim().is_empty() {
            return Err(StorageError::InvalidRecord(
                "status key must not be empty".to_owned(),
            ));
        }
        let value_json = serde_json::to_string(value)?;

        self.db.with_session(|session| {
            session.connection().execute(
                "INSERT INTO status (key, value_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at",
                params![key, value_json, Utc::now()],
            )?;
            Ok(())
        })
    }

    fn status(&self, key: &str) -> StorageResult<Option<StatusEntry>> {
        self.db.with_session(|session| {
            let row = session
                .connection()
                .query_row(
                    "SELECT key, value_json, updated_at FROM status WHERE key = ?1",
                    [key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, DateTime<Utc>>(2)?,
                        ))
                    },
                )
                .optional()?;
            row.map(status_entry).transpose()
        })
    }

    fn list_status(&self) -> StorageResult<Vec<StatusEntry>> {
        self.db.with_session(|session| {
            let mut stmt = session
                .connection()
                .prepare("SELECT key, value_json, updated_at FROM status ORDER BY key ASC")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, DateTime<Utc>>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(status_entry).collect()
        })
    }

    fn latest(&self, subsystem: &str) -> StorageResult<Option<Reading>> {
        self.db.with_session(|session| {
            let row = session
                .connection()
                .query_row(
                    "SELECT ts_ms, values_json FROM readings
                     WHERE subsystem = ?1
                     ORDER BY ts_ms DESC
                     LIMIT 1",
                    [subsystem],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;
            row.map(|(ts_ms, json)| reading_from_row(subsystem, ts_ms, &json))
                .transpose()
        })
    }

    fn count(&self, subsystem: &str) -> StorageResult<u64> {
        self.db.with_session(|session| {
            let count: i64 = session.connection().query_row(
                "SELECT COUNT(*) FROM readings WHERE subsystem = ?1",
                [subsystem],
                |row| row.get(0),
            )?;
            Ok(count.unsigned_abs())
        })
    }

    fn purge_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let cutoff_ms = ceil_millis(cutoff);
        self.db.with_session(|session| {
            let deleted = session
                .connection()
                .execute("DELETE FROM readings WHERE ts_ms < ?1", [cutoff_ms])?;
            Ok(deleted as u64)
        })
    }
}

/// Range pages read straight from SQLite
#[derive(Debug)]
struct SqlitePages {
    db: Arc<Database>,
}

impl PageReader for SqlitePages {
    fn read_page(
        &self,
        subsystem: &str,
        from_ms: i64,
        end_ms: i64,
        limit: u32,
    ) -> StorageResult<Vec<Reading>> {
        self.db.with_session(|session| read_page(session, subsystem, from_ms, end_ms, limit))
    }
}

fn read_page(
    session: &Session<'_>,
    subsystem: &str,
    from_ms: i64,
    end_ms: i64,
    limit: u32,
) -> StorageResult<Vec<Reading>> {
    let mut stmt = session.connection().prepare_cached(
        "SELECT ts_ms, values_json FROM readings
         WHERE subsystem = ?1 AND ts_ms >= ?2 AND ts_ms < ?3
         ORDER BY ts_ms ASC
         LIMIT ?4",
    )?;
    let rows = stmt
        .query_map(params![subsystem, from_ms, end_ms, limit], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(subsystem, from_ms, rows = rows.len(), "Range page read");
    rows.into_iter()
        .map(|(ts_ms, json)| reading_from_row(subsystem, ts_ms, &json))
        .collect()
}

fn reading_from_row(subsystem: &str, ts_ms: i64, values_json: &str) -> StorageResult<Reading> {
    let timestamp = DateTime::from_timestamp_millis(ts_ms).ok_or_else(|| {
        StorageError::InvalidRecord(format!("timestamp out of range: {ts_ms} ms"))
    })?;
    let values: BTreeMap<String, f64> = serde_json::from_str(values_json)?;
    Ok(Reading {
        subsystem: subsystem.to_owned(),
        timestamp,
        values,
    })
}

fn status_entry(
    (key, value_json, updated_at): (String, String, DateTime<Utc>),
) -> StorageResult<StatusEntry> {
    Ok(StatusEntry {
        key,
        value: serde_json::from_str(&value_json)?,
        updated_at,
    })
}
