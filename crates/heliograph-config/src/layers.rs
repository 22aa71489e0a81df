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

use std::collections::BTreeMap;
use std::fmt;

use heliograph_types::schema;

/// Configuration sources, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigLayer {
    /// Packaged defaults
    Defaults,
    /// Configuration file on disk
    File,
    /// Environment variable overrides
    Environment,
}

impl ConfigLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Defaults => "defaults",
            Self::File => "file",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration document being assembled from layers.
///
/// Values are merged per field: applying `battery.max_charge_rate` replaces
/// that one value and leaves the rest of `[battery]` alone. For every field the
/// layer that wrote it last is remembered.
#[derive(Debug, Clone)]
pub struct Layered {
    table: toml::Table,
    origins: BTreeMap<String, ConfigLayer>,
}

impl Layered {
    /// Start from the packaged defaults; every field originates there
    pub fn from_defaults(defaults: toml::Table) -> Self {
        let origins = schema::leaves(&defaults)
            .into_iter()
            .map(|(path, _)| (path, ConfigLayer::Defaults))
            .collect();
        Self {
            table: defaults,
            origins,
        }
    }

    /// Set a single `section.name` field on behalf of `layer`
    pub fn apply(&mut self, layer: ConfigLayer, path: &str, value: toml::Value) {
        let Some((section, name)) = path.split_once('.') else {
            return;
        };

        let entry = self
            .table
            .entry(section)
            .or_insert(toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        if let Some(fields) = entry.as_table_mut() {
            fields.insert(name.to_owned(), value);
            self.origins.insert(path.to_owned(), layer);
        }
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    /// Layer that last set `path`
    pub fn origin(&self, path: &str) -> Option<ConfigLayer> {
        self.origins.get(path).copied()
    }

    pub fn into_origins(self) -> BTreeMap<String, ConfigLayer> {
        self.origins
    }
}
