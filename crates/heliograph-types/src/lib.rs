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

//! Configuration model shared by every Heliograph crate: the typed
//! [`AppConfig`], the field [`schema`] it is validated against, and the
//! packaged [`defaults`].

pub mod config;
pub mod defaults;
pub mod schema;
pub mod validation;

pub use config::{
    AppConfig, BatteryConfig, BatteryMode, Currency, DashboardConfig, DatabaseConfig,
    DuplicatePolicy, GridConfig, Language, LogLevel, LoggingConfig, SolarConfig, SolarSource,
    Tariff,
};
pub use defaults::{default_table, defaults, render_documented};
pub use schema::{FieldKind, FieldSpec, SCHEMA, SECTIONS, Validated, validate_and_construct};
pub use validation::{ValidationError, ValidationIssue, ValidationResult, ValidationSeverity};
