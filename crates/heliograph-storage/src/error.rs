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

//! Storage error types

use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage is unreachable or its existing structure is incompatible
    #[error("failed to initialize storage: {0}")]
    Init(String),

    #[error("storage is not initialized, call init_db() first")]
    NotInitialized,

    #[error("reading for `{subsystem}` at {timestamp} already exists")]
    DuplicateKey {
        subsystem: String,
        timestamp: DateTime<Utc>,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Transient contention; the same operation may succeed if retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            Self::Init(_)
            | Self::NotInitialized
            | Self::DuplicateKey { .. }
            | Self::InvalidRecord(_)
            | Self::Sqlite(_)
            | Self::Serialization(_) => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_busy_is_retryable() {
        let busy = StorageError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_retryable());
        assert!(!StorageError::NotInitialized.is_retryable());
    }

    #[test]
    fn test_duplicate_key_message() {
        let error = StorageError::DuplicateKey {
            subsystem: "solar".to_owned(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        };
        assert_eq!(
            error.to_string(),
            "reading for `solar` at 2025-06-01 12:00:00 UTC already exists"
        );
    }
}
