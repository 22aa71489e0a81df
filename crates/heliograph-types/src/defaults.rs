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

//! The packaged default configuration.
//!
//! Everything that needs "the defaults" (the base configuration layer, test
//! fixtures, the sample file printed by `heliograph --print-defaults`) goes
//! through [`defaults`], so there is exactly one set of default values.

use std::fmt::Write as _;

use crate::config::AppConfig;
use crate::schema::{self, SECTIONS};

/// The canonical default configuration, built without any external input
pub fn defaults() -> AppConfig {
    AppConfig::default()
}

/// [`defaults`] as a raw TOML table, the lowest configuration layer
pub fn default_table() -> Result<toml::Table, toml::ser::Error> {
    defaults().to_table()
}

/// Render a configuration as a commented TOML document, one comment per field
pub fn render_documented(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let table = config.to_table()?;
    let mut out = String::new();

    for (idx, section) in SECTIONS.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        // Writing to a String cannot fail
        let _ = writeln!(out, "[{section}]");
        for spec in schema::fields_in(section) {
            if let Some(value) = schema::lookup(&table, spec.path) {
                let _ = writeln!(out, "# {}", spec.doc);
                let _ = writeln!(out, "{} = {value}", spec.name());
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate_and_construct;

    #[test]
    fn test_defaults_pass_schema_validation() {
        let table = default_table().unwrap();
        let validated = validate_and_construct(&table).unwrap();

        assert_eq!(validated.config, defaults());
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn test_defaults_are_stable() {
        assert_eq!(defaults(), defaults());
        assert_eq!(default_table().unwrap(), default_table().unwrap());
    }

    #[test]
    fn test_documented_defaults_parse_back() {
        let rendered = render_documented(&defaults()).unwrap();

        assert!(rendered.contains("[battery]"));
        assert!(rendered.contains("# Maximum sustained charge power (kW)"));
        assert!(rendered.contains("max_charge_rate = 5.0"));

        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, defaults());
    }

    #[test]
    fn test_documented_render_of_custom_config() {
        let mut config = defaults();
        config.battery.max_charge_rate = 7.5;
        config.dashboard.bind_address = "127.0.0.1".to_owned();

        let rendered = render_documented(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
