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

//! Error types for configuration loading

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::layers::ConfigLayer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    FileParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("unknown configuration keys: {}", join(.keys))]
    UnknownKeys { keys: Vec<UnknownKey> },

    #[error("failed to render default configuration: {0}")]
    Defaults(#[from] toml::ser::Error),
}

impl ConfigError {
    /// The config file exists but could not be read or parsed
    pub fn is_file_error(&self) -> bool {
        matches!(self, Self::FileRead { .. } | Self::FileParse { .. })
    }

    /// Invalid fields, if this is a validation failure
    pub fn invalid_fields(&self) -> &[InvalidField] {
        match self {
            Self::Validation(failure) => &failure.fields,
            Self::FileRead { .. }
            | Self::FileParse { .. }
            | Self::UnknownKeys { .. }
            | Self::Defaults(_) => &[],
        }
    }
}

/// One field that failed validation, and the layer that last set it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub field: String,
    pub message: String,
    pub layer: ConfigLayer,
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (from {}): {}", self.field, self.layer, self.message)
    }
}

/// The merged configuration failed validation; lists every invalid field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", join(.fields))]
pub struct ValidationFailure {
    pub fields: Vec<InvalidField>,
}

/// A key that does not map to any configuration field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey {
    pub key: String,
    pub layer: ConfigLayer,
}

impl fmt::Display for UnknownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` ({})", self.key, self.layer)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_lists_every_field() {
        let error = ConfigError::from(ValidationFailure {
            fields: vec![
                InvalidField {
                    field: "battery.min_soc".to_owned(),
                    message: "Must be between 0 and 100, got -5".to_owned(),
                    layer: ConfigLayer::File,
                },
                InvalidField {
                    field: "dashboard.port".to_owned(),
                    message: "Expected an integer, got string \"http\"".to_owned(),
                    layer: ConfigLayer::Environment,
                },
            ],
        });

        let message = error.to_string();
        assert!(message.contains("battery.min_soc (from file)"));
        assert!(message.contains("dashboard.port (from environment)"));
        assert_eq!(error.invalid_fields().len(), 2);
        assert!(!error.is_file_error());
    }

    #[test]
    fn test_unknown_keys_message() {
        let error = ConfigError::UnknownKeys {
            keys: vec![UnknownKey {
                key: "BATTERY_MAX_CHARGE_RAT".to_owned(),
                layer: ConfigLayer::Environment,
            }],
        };
        assert_eq!(
            error.to_string(),
            "unknown configuration keys: `BATTERY_MAX_CHARGE_RAT` (environment)"
        );
    }

    #[test]
    fn test_file_error_classification() {
        let error = ConfigError::FileRead {
            path: PathBuf::from("/etc/heliograph.toml"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(error.is_file_error());
        assert!(error.to_string().contains("/etc/heliograph.toml"));
    }
}
