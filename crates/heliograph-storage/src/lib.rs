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

//! Persistence for Heliograph: the SQLite [`Database`] engine with scoped
//! sessions, and the [`TelemetryRepository`] every other component reads and
//! writes through.

pub mod engine;
pub mod error;
pub mod reading;
pub mod repository;

pub use engine::{Database, SCHEMA_VERSION, Session};
pub use error::{StorageError, StorageResult};
pub use reading::{Reading, RecordOutcome, StatusEntry};
pub use repository::{
    PageReader, RangeIter, ReadingRange, SqliteRepository, TelemetryRepository,
};
