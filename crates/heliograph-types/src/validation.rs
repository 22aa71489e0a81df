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
use thiserror::Error;

/// Validation result with detailed field-level errors and warnings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Validation errors (prevent config from being used)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (config can be used but may not be optimal)
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Turn the collected errors into a [`ValidationError`], if there are any
    pub fn into_error(self) -> Option<ValidationError> {
        if self.has_errors() {
            Some(ValidationError {
                issues: self.errors,
            })
        } else {
            None
        }
    }
}

/// A validation issue (error or warning)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Field path (e.g., "battery.min_soc")
    pub field: String,
    /// Human-readable error message
    pub message: String,
    pub severity: ValidationSeverity,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Severity level of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    /// Prevents config from being used
    Error,
    /// Config can be used but may not be optimal
    Warning,
}

/// Every field that failed validation, collected in a single pass
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Field paths of all offending fields, in reporting order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|issue| issue.field.as_str())
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_collects_all_errors() {
        let mut result = ValidationResult::success();
        assert!(!result.has_errors());

        result.add_error("battery.min_soc", "Must be between 0 and 100");
        result.add_error("grid.max_import_w", "Must be at least 1");
        result.add_warning("database.retention_days", "Value is very high");

        assert!(result.has_errors());
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].severity, ValidationSeverity::Warning);

        let error = result.into_error().unwrap();
        assert_eq!(
            error.fields().collect::<Vec<_>>(),
            vec!["battery.min_soc", "grid.max_import_w"]
        );
        let message = error.to_string();
        assert!(message.contains("battery.min_soc: Must be between 0 and 100"));
        assert!(message.contains("grid.max_import_w: Must be at least 1"));
    }

    #[test]
    fn test_warnings_alone_are_not_an_error() {
        let mut result = ValidationResult::success();
        result.add_warning("grid.max_export_w", "No export will be allowed");
        assert!(result.into_error().is_none());
    }

    #[test]
    fn test_merge() {
        let mut a = ValidationResult::success();
        a.add_error("a", "bad");
        let mut b = ValidationResult::success();
        b.add_warning("b", "meh");

        a.merge(b);
        assert_eq!(a.errors.len(), 1);
        assert_eq!(a.warnings.len(), 1);
    }
}
