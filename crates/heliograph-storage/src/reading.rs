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

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::{StorageError, StorageResult};

/// One immutable observation of a subsystem.
///
/// Identity is `(subsystem, timestamp)`. Timestamps are kept at millisecond
/// precision, the resolution of the storage key; both [`Reading::new`] and
/// deserialization truncate anything finer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Subsystem identifier, e.g. `solar`, `battery`, `grid`
    pub subsystem: String,
    #[serde(deserialize_with = "deserialize_millis")]
    pub(crate) timestamp: DateTime<Utc>,
    /// Metric name to measured value
    pub values: BTreeMap<String, f64>,
}

impl Reading {
    pub fn new(subsystem: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            subsystem: subsystem.into(),
            timestamp: timestamp.trunc_subsecs(3),
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.values.insert(metric.into(), value);
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    pub(crate) fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    pub(crate) fn validate(&self) -> StorageResult<()> {
        if self.subsystem.trim().is_empty() {
            return Err(StorageError::InvalidRecord(
                "subsystem must not be empty".to_owned(),
            ));
        }
        if let Some((metric, value)) = self.values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(StorageError::InvalidRecord(format!(
                "{}.{metric} is not a finite number: {value}",
                self.subsystem
            )));
        }
        Ok(())
    }
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    DateTime::<Utc>::deserialize(deserializer).map(|t| t.trunc_subsecs(3))
}

/// Result of appending a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// Same identity already stored and duplicates are ignored; nothing written
    AlreadyPresent,
}

/// A mutable status row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Smallest millisecond instant not before `t`
pub(crate) fn ceil_millis(t: DateTime<Utc>) -> i64 {
    let ms = t.timestamp_millis();
    if t.trunc_subsecs(3) < t { ms + 1 } else { ms }
}
