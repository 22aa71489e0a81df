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

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Main application configuration
///
/// Every section carries its own defaults, so a partially specified document
/// deserializes into a complete configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// PV array and inverter
    pub solar: SolarConfig,

    /// Battery storage limits
    pub battery: BatteryConfig,

    /// Grid connection limits and tariff
    pub grid: GridConfig,

    /// Web dashboard
    pub dashboard: DashboardConfig,

    /// Telemetry database
    pub database: DatabaseConfig,

    /// Log output
    pub logging: LoggingConfig,
}

/// Where solar production readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarSource {
    #[default]
    HomeAssistant,
    Modbus,
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarConfig {
    pub source: SolarSource,

    /// Installed peak power of all arrays (kWp)
    pub peak_power_kw: f64,

    /// Number of independently tracked strings/arrays
    pub array_count: u32,

    /// DC to AC conversion efficiency (0.0 to 1.0)
    pub inverter_efficiency: f64,

    /// How often the source is sampled
    pub poll_interval_secs: u64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            source: SolarSource::default(),
            peak_power_kw: 10.0,
            array_count: 1,
            inverter_efficiency: 0.97,
            poll_interval_secs: 30,
        }
    }
}

impl SolarConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Battery operation mode when no forced charge/discharge is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryMode {
    /// Normal self-consumption, battery used to minimize grid import
    #[default]
    SelfUse,
    /// Keep the battery full as an outage reserve
    Backup,
    /// Export surplus before charging
    FeedInPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Usable capacity in kWh
    pub capacity_kwh: f64,

    /// Maximum sustained charge power in kW
    pub max_charge_rate: f64,

    /// Maximum sustained discharge power in kW
    pub max_discharge_rate: f64,

    /// Lowest state of charge the control loop may target (percent)
    pub min_soc: f64,

    /// Highest state of charge the control loop may target (percent)
    pub max_soc: f64,

    /// Round-trip efficiency (0.0 to 1.0), typical lithium-ion: 0.90-0.95
    pub round_trip_efficiency: f64,

    pub mode: BatteryMode,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 23.0,
            max_charge_rate: 5.0,
            max_discharge_rate: 5.0,
            min_soc: 10.0,
            max_soc: 100.0,
            round_trip_efficiency: 0.95,
            mode: BatteryMode::default(),
        }
    }
}

impl BatteryConfig {
    /// Energy between the configured SOC limits in kWh
    pub fn usable_energy_kwh(&self) -> f64 {
        self.capacity_kwh * (self.max_soc - self.min_soc) / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tariff {
    #[default]
    Spot,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Eur,
    Czk,
    Usd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Contracted export limit in watts; 0 disables export
    pub max_export_w: u32,

    /// Main breaker import limit in watts
    pub max_import_w: u32,

    pub tariff: Tariff,

    /// Currency prices are displayed in
    pub currency: Currency,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            max_export_w: 5000,
            max_import_w: 11000,
            tariff: Tariff::default(),
            currency: Currency::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Cs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub bind_address: String,
    pub port: u16,

    /// Browser polling interval for live tiles
    pub refresh_interval_secs: u64,

    /// How far back history charts reach
    pub history_days: u32,

    pub language: Language,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_owned(),
            port: 8099,
            refresh_interval_secs: 10,
            history_days: 7,
            language: Language::default(),
        }
    }
}

impl DashboardConfig {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// What `record` does when a reading with the same subsystem and timestamp exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with a duplicate-key error
    #[default]
    Reject,
    /// Keep the stored reading and report it as already present
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: String,

    /// How long a connection waits on a locked database
    pub busy_timeout_ms: u64,

    /// Write-ahead log journal mode
    pub wal: bool,

    /// Readings older than this are eligible for purging
    pub retention_days: u32,

    pub duplicate_policy: DuplicatePolicy,

    /// Rows fetched per round-trip when streaming a time range
    pub page_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/heliograph.db".to_owned(),
            busy_timeout_ms: 5000,
            wal: true,
            retention_days: 30,
            duplicate_policy: DuplicatePolicy::default(),
            page_size: 500,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: LogLevel,
}

impl AppConfig {
    /// Render this configuration as a TOML table, one sub-table per section
    pub fn to_table(&self) -> Result<toml::Table, toml::ser::Error> {
        match toml::Value::try_from(self)? {
            toml::Value::Table(table) => Ok(table),
            other => Err(<toml::ser::Error as serde::ser::Error>::custom(format!(
                "configuration serialized to {} instead of a table",
                other.type_str()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.solar.source, SolarSource::HomeAssistant);
        assert_eq!(config.battery.mode, BatteryMode::SelfUse);
        assert_eq!(config.dashboard.port, 8099);
        assert_eq!(config.database.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(config.logging.level, LogLevel::Info);

        assert!(!schema::check_table(&config.to_table().unwrap()).has_errors());
    }

    #[test]
    fn test_partial_section_keeps_sibling_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [battery]
            max_charge_rate = 7.5
            "#,
        )
        .unwrap();

        assert!((config.battery.max_charge_rate - 7.5).abs() < f64::EPSILON);
        assert_eq!(config.battery, BatteryConfig {
            max_charge_rate: 7.5,
            ..BatteryConfig::default()
        });
        assert_eq!(config.grid, GridConfig::default());
    }

    #[test]
    fn test_enum_spellings() {
        let config: AppConfig = toml::from_str(
            r#"
            [solar]
            source = "modbus"

            [battery]
            mode = "feed_in_priority"

            [grid]
            currency = "CZK"
            tariff = "fixed"

            [database]
            duplicate_policy = "ignore"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.solar.source, SolarSource::Modbus);
        assert_eq!(config.battery.mode, BatteryMode::FeedInPriority);
        assert_eq!(config.grid.currency, Currency::Czk);
        assert_eq!(config.grid.tariff, Tariff::Fixed);
        assert_eq!(config.database.duplicate_policy, DuplicatePolicy::Ignore);
        assert_eq!(config.logging.level.to_string(), "debug");
    }

    #[test]
    fn test_unknown_field_is_rejected_by_serde() {
        let result: Result<AppConfig, _> = toml::from_str(
            r#"
            [battery]
            max_charge_rat = 7.5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_derived_values() {
        let config = AppConfig::default();

        assert_eq!(config.solar.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.database.busy_timeout(), Duration::from_millis(5000));
        assert_eq!(config.dashboard.socket_address(), "0.0.0.0:8099");
        assert!((config.battery.usable_energy_kwh() - 20.7).abs() < 1e-9);
    }

    #[test]
    fn test_soc_inversion_detected_on_rendered_table() {
        let mut config = AppConfig::default();
        config.battery.min_soc = 80.0;
        config.battery.max_soc = 70.0;

        let result = schema::check_table(&config.to_table().unwrap());
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.field == "battery.min_soc"));
    }
}
