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

//! Static description of every configuration field.
//!
//! The table below is the single place where field types, ranges and allowed
//! choices live. Checking works on raw TOML values so that one pass can report
//! every bad field, including ones whose type is wrong, before anything is
//! deserialized into [`AppConfig`].

use crate::config::AppConfig;
use crate::validation::{ValidationError, ValidationIssue, ValidationResult};

/// Top-level sections, in documentation order
pub const SECTIONS: &[&str] = &[
    "solar",
    "battery",
    "grid",
    "dashboard",
    "database",
    "logging",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Bool,
    Integer {
        min: i64,
        max: i64,
    },
    Float {
        min: f64,
        max: f64,
        /// `min` itself is not allowed
        exclusive_min: bool,
    },
    Text {
        allow_empty: bool,
    },
    Choice(&'static [&'static str]),
}

impl FieldKind {
    fn describe(self) -> String {
        match self {
            Self::Bool => "a boolean".to_owned(),
            Self::Integer { .. } => "an integer".to_owned(),
            Self::Float { .. } => "a number".to_owned(),
            Self::Text { .. } => "a string".to_owned(),
            Self::Choice(options) => format!("one of {}", options.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Dotted path, `section.name`
    pub path: &'static str,
    pub kind: FieldKind,
    pub doc: &'static str,
}

pub static SCHEMA: &[FieldSpec] = &[
    // solar
    FieldSpec {
        path: "solar.source",
        kind: FieldKind::Choice(&["home_assistant", "modbus", "simulated"]),
        doc: "Where production readings come from",
    },
    FieldSpec {
        path: "solar.peak_power_kw",
        kind: FieldKind::Float {
            min: 0.0,
            max: 1000.0,
            exclusive_min: true,
        },
        doc: "Installed peak power of all arrays (kWp)",
    },
    FieldSpec {
        path: "solar.array_count",
        kind: FieldKind::Integer { min: 1, max: 64 },
        doc: "Number of independently tracked strings/arrays",
    },
    FieldSpec {
        path: "solar.inverter_efficiency",
        kind: FieldKind::Float {
            min: 0.0,
            max: 1.0,
            exclusive_min: true,
        },
        doc: "DC to AC conversion efficiency (0.0 to 1.0)",
    },
    FieldSpec {
        path: "solar.poll_interval_secs",
        kind: FieldKind::Integer { min: 5, max: 3600 },
        doc: "How often the source is sampled (seconds)",
    },
    // battery
    FieldSpec {
        path: "battery.capacity_kwh",
        kind: FieldKind::Float {
            min: 0.0,
            max: 1000.0,
            exclusive_min: true,
        },
        doc: "Usable battery capacity (kWh)",
    },
    FieldSpec {
        path: "battery.max_charge_rate",
        kind: FieldKind::Float {
            min: 0.0,
            max: 100.0,
            exclusive_min: true,
        },
        doc: "Maximum sustained charge power (kW)",
    },
    FieldSpec {
        path: "battery.max_discharge_rate",
        kind: FieldKind::Float {
            min: 0.0,
            max: 100.0,
            exclusive_min: true,
        },
        doc: "Maximum sustained discharge power (kW)",
    },
    FieldSpec {
        path: "battery.min_soc",
        kind: FieldKind::Float {
            min: 0.0,
            max: 100.0,
            exclusive_min: false,
        },
        doc: "Lowest state of charge the control loop may target (percent)",
    },
    FieldSpec {
        path: "battery.max_soc",
        kind: FieldKind::Float {
            min: 0.0,
            max: 100.0,
            exclusive_min: false,
        },
        doc: "Highest state of charge the control loop may target (percent)",
    },
    FieldSpec {
        path: "battery.round_trip_efficiency",
        kind: FieldKind::Float {
            min: 0.0,
            max: 1.0,
            exclusive_min: true,
        },
        doc: "Round-trip efficiency (0.0 to 1.0)",
    },
    FieldSpec {
        path: "battery.mode",
        kind: FieldKind::Choice(&["self_use", "backup", "feed_in_priority"]),
        doc: "Operation mode when no forced charge/discharge is active",
    },
    // grid
    FieldSpec {
        path: "grid.max_export_w",
        kind: FieldKind::Integer {
            min: 0,
            max: 1_000_000,
        },
        doc: "Contracted export limit (W), 0 disables export",
    },
    FieldSpec {
        path: "grid.max_import_w",
        kind: FieldKind::Integer {
            min: 1,
            max: 1_000_000,
        },
        doc: "Main breaker import limit (W)",
    },
    FieldSpec {
        path: "grid.tariff",
        kind: FieldKind::Choice(&["spot", "fixed"]),
        doc: "Electricity tariff type",
    },
    FieldSpec {
        path: "grid.currency",
        kind: FieldKind::Choice(&["EUR", "CZK", "USD"]),
        doc: "Display currency",
    },
    // dashboard
    FieldSpec {
        path: "dashboard.bind_address",
        kind: FieldKind::Text { allow_empty: false },
        doc: "Address the dashboard listens on",
    },
    FieldSpec {
        path: "dashboard.port",
        kind: FieldKind::Integer { min: 1, max: 65535 },
        doc: "Port the dashboard listens on",
    },
    FieldSpec {
        path: "dashboard.refresh_interval_secs",
        kind: FieldKind::Integer { min: 1, max: 3600 },
        doc: "Browser polling interval for live tiles (seconds)",
    },
    FieldSpec {
        path: "dashboard.history_days",
        kind: FieldKind::Integer { min: 1, max: 365 },
        doc: "How far back history charts reach (days)",
    },
    FieldSpec {
        path: "dashboard.language",
        kind: FieldKind::Choice(&["en", "cs"]),
        doc: "UI language",
    },
    // database
    FieldSpec {
        path: "database.path",
        kind: FieldKind::Text { allow_empty: false },
        doc: "SQLite database file",
    },
    FieldSpec {
        path: "database.busy_timeout_ms",
        kind: FieldKind::Integer { min: 0, max: 60_000 },
        doc: "How long a connection waits on a locked database (ms)",
    },
    FieldSpec {
        path: "database.wal",
        kind: FieldKind::Bool,
        doc: "Use the write-ahead log journal so readers do not block the writer",
    },
    FieldSpec {
        path: "database.retention_days",
        kind: FieldKind::Integer { min: 1, max: 3650 },
        doc: "Readings older than this are purged (days)",
    },
    FieldSpec {
        path: "database.duplicate_policy",
        kind: FieldKind::Choice(&["reject", "ignore"]),
        doc: "What recording an existing (subsystem, timestamp) does",
    },
    FieldSpec {
        path: "database.page_size",
        kind: FieldKind::Integer {
            min: 1,
            max: 10_000,
        },
        doc: "Rows fetched per round-trip when streaming a time range",
    },
    // logging
    FieldSpec {
        path: "logging.level",
        kind: FieldKind::Choice(&["trace", "debug", "info", "warn", "error"]),
        doc: "Default log level when RUST_LOG is not set",
    },
];

impl FieldSpec {
    pub fn section(&self) -> &'static str {
        self.path.split_once('.').map_or(self.path, |(section, _)| section)
    }

    pub fn name(&self) -> &'static str {
        self.path.split_once('.').map_or(self.path, |(_, name)| name)
    }

    /// Environment variable that overrides this field,
    /// e.g. `BATTERY_MAX_CHARGE_RATE` for `battery.max_charge_rate`
    pub fn env_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.path.replace('.', "_").to_ascii_uppercase())
    }

    /// Check a single raw value against this field's type and range
    pub fn check(&self, value: &toml::Value) -> Result<(), String> {
        match (self.kind, value) {
            (FieldKind::Bool, toml::Value::Boolean(_)) => Ok(()),
            (FieldKind::Integer { min, max }, toml::Value::Integer(v)) => {
                if (min..=max).contains(v) {
                    Ok(())
                } else {
                    Err(format!("Must be between {min} and {max}, got {v}"))
                }
            }
            (FieldKind::Float { .. }, toml::Value::Float(v)) => self.check_float(*v),
            (FieldKind::Float { .. }, toml::Value::Integer(v)) => self.check_float(int_to_float(*v)),
            (FieldKind::Text { allow_empty }, toml::Value::String(s)) => {
                if allow_empty || !s.trim().is_empty() {
                    Ok(())
                } else {
                    Err("Must not be empty".to_owned())
                }
            }
            (FieldKind::Choice(options), toml::Value::String(s)) => {
                if options.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!(
                        "Must be one of {}, got \"{s}\"",
                        options.join(", ")
                    ))
                }
            }
            (kind, other) => Err(format!(
                "Expected {}, got {} {other}",
                kind.describe(),
                other.type_str()
            )),
        }
    }

    fn check_float(&self, v: f64) -> Result<(), String> {
        let FieldKind::Float {
            min,
            max,
            exclusive_min,
        } = self.kind
        else {
            return Ok(());
        };

        if !v.is_finite() {
            return Err(format!("Must be a finite number, got {v}"));
        }
        if exclusive_min {
            if v <= min || v > max {
                return Err(format!(
                    "Must be greater than {min} and at most {max}, got {v}"
                ));
            }
        } else if v < min || v > max {
            return Err(format!("Must be between {min} and {max}, got {v}"));
        }
        Ok(())
    }

    /// Parse an environment variable value into the TOML value this field expects.
    ///
    /// Surrounding whitespace is ignored for every kind.
    /// Values that do not parse are kept as strings so that [`FieldSpec::check`]
    /// reports them together with every other invalid field.
    pub fn parse_env(&self, raw: &str) -> toml::Value {
        let trimmed = raw.trim();
        match self.kind {
            FieldKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => toml::Value::Boolean(true),
                "false" | "0" | "no" | "off" => toml::Value::Boolean(false),
                _ => toml::Value::String(trimmed.to_owned()),
            },
            FieldKind::Integer { .. } => trimmed
                .parse::<i64>()
                .map_or_else(|_| toml::Value::String(trimmed.to_owned()), toml::Value::Integer),
            FieldKind::Float { .. } => trimmed
                .parse::<f64>()
                .map_or_else(|_| toml::Value::String(trimmed.to_owned()), toml::Value::Float),
            FieldKind::Text { .. } | FieldKind::Choice(_) => {
                toml::Value::String(trimmed.to_owned())
            }
        }
    }
}

#[expect(clippy::cast_precision_loss, reason = "config integers are small")]
fn int_to_float(v: i64) -> f64 {
    v as f64
}

/// Look up a field by its dotted path
pub fn field(path: &str) -> Option<&'static FieldSpec> {
    SCHEMA.iter().find(|spec| spec.path == path)
}

/// Fields of one section, in declaration order
pub fn fields_in(section: &str) -> impl Iterator<Item = &'static FieldSpec> + '_ {
    SCHEMA.iter().filter(move |spec| spec.section() == section)
}

/// Resolve a dotted path inside a table
pub fn lookup<'a>(table: &'a toml::Table, path: &str) -> Option<&'a toml::Value> {
    let mut parts = path.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

/// Flatten a document into `(path, value)` pairs.
///
/// Known sections are expanded one level; anything else, including a known
/// section that is not a table, is returned as-is so it shows up as an
/// unknown path.
pub fn leaves(table: &toml::Table) -> Vec<(String, &toml::Value)> {
    let mut out = Vec::new();
    for (key, value) in table {
        if let toml::Value::Table(section) = value
            && SECTIONS.contains(&key.as_str())
        {
            for (name, leaf) in section {
                out.push((format!("{key}.{name}"), leaf));
            }
        } else {
            out.push((key.clone(), value));
        }
    }
    out
}

/// Paths present in the document that do not name a schema field
pub fn unknown_fields(table: &toml::Table) -> Vec<String> {
    leaves(table)
        .into_iter()
        .filter(|(path, _)| field(path).is_none())
        .map(|(path, _)| path)
        .collect()
}

/// Run every field and cross-field rule over a raw document.
///
/// Missing fields are not an error; they take their default on construction.
pub fn check_table(table: &toml::Table) -> ValidationResult {
    let mut result = ValidationResult::success();

    for path in unknown_fields(table) {
        result.add_error(path, "Unknown configuration field");
    }

    for spec in SCHEMA {
        if let Some(value) = lookup(table, spec.path)
            && let Err(message) = spec.check(value)
        {
            result.add_error(spec.path, message);
        }
    }

    result.merge(cross_field_rules(table));
    result.merge(warnings(table));

    result
}

fn number(table: &toml::Table, path: &str) -> Option<f64> {
    match lookup(table, path)? {
        toml::Value::Float(v) => Some(*v),
        toml::Value::Integer(v) => Some(int_to_float(*v)),
        toml::Value::String(_)
        | toml::Value::Boolean(_)
        | toml::Value::Datetime(_)
        | toml::Value::Array(_)
        | toml::Value::Table(_) => None,
    }
}

fn cross_field_rules(table: &toml::Table) -> ValidationResult {
    let mut result = ValidationResult::success();
    let defaults = AppConfig::default();
    let min_soc = number(table, "battery.min_soc").unwrap_or(defaults.battery.min_soc);
    let max_soc = number(table, "battery.max_soc").unwrap_or(defaults.battery.max_soc);
    if min_soc >= max_soc {
        result.add_error(
            "battery.min_soc",
            format!("Must be less than battery.max_soc ({max_soc}), got {min_soc}"),
        );
    }
    result
}

fn warnings(table: &toml::Table) -> ValidationResult {
    let mut result = ValidationResult::success();
    if let Some(toml::Value::Integer(days)) = lookup(table, "database.retention_days")
        && *days > 365
    {
        result.add_warning(
            "database.retention_days",
            format!("Value is very high ({days} days), the database will grow large"),
        );
    }
    if let Some(toml::Value::Integer(0)) = lookup(table, "grid.max_export_w") {
        result.add_warning("grid.max_export_w", "No export to the grid will be allowed");
    }
    result
}

/// A configuration that passed validation, with any non-fatal warnings
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub config: AppConfig,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate a raw document and build the typed configuration from it.
///
/// Fails with every offending field at once; nothing is constructed unless the
/// whole document is valid.
pub fn validate_and_construct(table: &toml::Table) -> Result<Validated, ValidationError> {
    let result = check_table(table);
    let warnings = result.warnings.clone();
    if let Some(error) = result.into_error() {
        return Err(error);
    }

    let config: AppConfig = toml::Value::Table(table.clone())
        .try_into()
        .map_err(|e| {
            let mut result = ValidationResult::success();
            result.add_error("", format!("Failed to build configuration: {e}"));
            ValidationError {
                issues: result.errors,
            }
        })?;

    Ok(Validated { config, warnings })
}
