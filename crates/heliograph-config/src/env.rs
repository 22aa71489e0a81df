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

//! Environment variable overrides.
//!
//! Every schema field `section.name` has exactly one variable,
//! `{PREFIX}{SECTION}_{NAME}` in upper case:
//!
//! | Variable | Field |
//! |---|---|
//! | `BATTERY_MAX_CHARGE_RATE` | `battery.max_charge_rate` |
//! | `DASHBOARD_PORT` | `dashboard.port` |
//! | `DATABASE_PATH` | `database.path` |
//! | `LOGGING_LEVEL` | `logging.level` |
//!
//! and so on for the rest of [`SCHEMA`]. `{PREFIX}{SECTION}_` is reserved for
//! every section: a variable under a reserved prefix that names no field is an
//! unknown key. Other variables are not looked at.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use heliograph_types::schema::{FieldSpec, SCHEMA, SECTIONS};

/// Where environment variables are read from
pub trait EnvSource: Send + Sync + fmt::Debug {
    fn vars(&self) -> Vec<(String, String)>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn vars(&self) -> Vec<(String, String)> {
        // Non-UTF-8 variables can't name a field
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }
}

impl EnvSource for HashMap<String, String> {
    fn vars(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn vars(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Overrides found in one snapshot of the environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    /// Mapped fields with their parsed values, sorted by variable name
    pub values: Vec<(&'static FieldSpec, toml::Value)>,
    /// Variables under a reserved prefix that map to no field
    pub unknown: Vec<String>,
}

/// Variable name for every field, in schema order
pub fn env_vars(prefix: &str) -> Vec<(String, &'static FieldSpec)> {
    SCHEMA.iter().map(|spec| (spec.env_key(prefix), spec)).collect()
}

fn reserved_prefixes(prefix: &str) -> Vec<String> {
    SECTIONS
        .iter()
        .map(|section| format!("{prefix}{}_", section.to_ascii_uppercase()))
        .collect()
}

/// Pick the configuration overrides out of an environment snapshot
pub fn collect_overrides(
    vars: impl IntoIterator<Item = (String, String)>,
    prefix: &str,
) -> EnvOverrides {
    let mapping: HashMap<String, &'static FieldSpec> = env_vars(prefix).into_iter().collect();
    let reserved = reserved_prefixes(prefix);

    let mut vars: Vec<_> = vars.into_iter().collect();
    vars.sort();

    let mut overrides = EnvOverrides::default();
    for (name, raw) in vars {
        if let Some(spec) = mapping.get(&name) {
            overrides.values.push((*spec, spec.parse_env(&raw)));
        } else if reserved.iter().any(|p| name.starts_with(p.as_str())) {
            overrides.unknown.push(name);
        }
    }
    overrides
}
