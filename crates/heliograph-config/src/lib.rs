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

//! Layered configuration for Heliograph.
//!
//! [`ConfigManager`] resolves an [`AppConfig`](heliograph_types::AppConfig)
//! from packaged defaults, an optional TOML file and environment variables,
//! in that order of precedence, and swaps it in atomically on reload.

pub mod env;
pub mod error;
pub mod layers;
pub mod manager;

pub use env::{EnvSource, ProcessEnv, env_vars};
pub use error::{ConfigError, InvalidField, Result, UnknownKey, ValidationFailure};
pub use layers::ConfigLayer;
pub use manager::{ConfigManager, LoadState, ManagerOptions, UnknownKeyPolicy};
