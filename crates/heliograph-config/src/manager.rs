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

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use heliograph_types::{
    AppConfig, Validated, ValidationIssue, default_table, schema, validate_and_construct,
};

use crate::env::{EnvSource, ProcessEnv, collect_overrides};
use crate::error::{ConfigError, InvalidField, Result, UnknownKey, ValidationFailure};
use crate::layers::{ConfigLayer, Layered};

/// What to do with keys that name no configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeyPolicy {
    /// Fail the load
    #[default]
    Reject,
    /// Log a warning and drop the key
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Configuration file; a missing file means "no overrides"
    pub config_path: PathBuf,
    /// Prepended to every environment variable name
    pub env_prefix: String,
    pub unknown_keys: UnknownKeyPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.toml"),
            env_prefix: String::new(),
            unknown_keys: UnknownKeyPolicy::default(),
        }
    }
}

impl ManagerOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.unknown_keys = policy;
        self
    }
}

/// Lifecycle of the managed configuration
///
/// `Unloaded → Loading → Loaded | LoadFailed`, and back to `Loading` on every
/// load or reload. A failed load keeps serving the last good configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    LoadFailed,
}

/// One successfully resolved configuration, swapped in as a unit
#[derive(Debug)]
struct Resolved {
    config: Arc<AppConfig>,
    origins: BTreeMap<String, ConfigLayer>,
    warnings: Vec<ValidationIssue>,
}

/// Owns the process-wide [`AppConfig`].
///
/// Readers get an `Arc` snapshot from [`ConfigManager::current`]; a reload
/// builds a complete new configuration and replaces the pointer, so a reader
/// sees either the old or the new instance, never a mix.
#[derive(Debug)]
pub struct ConfigManager {
    options: ManagerOptions,
    env: Box<dyn EnvSource>,
    active: RwLock<Option<Arc<Resolved>>>,
    state: RwLock<LoadState>,
    // Serializes load/reload; readers never take it
    load_lock: Mutex<()>,
    generation: AtomicU64,
}

impl ConfigManager {
    /// Manager reading overrides from the process environment
    pub fn new(options: ManagerOptions) -> Self {
        Self::with_env(options, ProcessEnv)
    }

    pub fn with_env(options: ManagerOptions, env: impl EnvSource + 'static) -> Self {
        Self {
            options,
            env: Box::new(env),
            active: RwLock::new(None),
            state: RwLock::new(LoadState::Unloaded),
            load_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Resolve all layers and make the result the active configuration.
    ///
    /// On error the previously active configuration (if any) stays in place.
    pub fn load(&self) -> Result<Arc<AppConfig>> {
        let _guard = self.load_lock.lock();
        let attempt = LoadAttempt::begin(&self.state);

        match self.resolve() {
            Ok(resolved) => {
                for warning in &resolved.warnings {
                    warn!(field = %warning.field, "⚠️ {}", warning.message);
                }

                let config = Arc::clone(&resolved.config);
                *self.active.write() = Some(Arc::new(resolved));
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                attempt.finish(LoadState::Loaded);

                info!(
                    generation,
                    path = %self.options.config_path.display(),
                    "✅ Configuration loaded"
                );
                Ok(config)
            }
            Err(e) => {
                attempt.finish(LoadState::LoadFailed);
                warn!("Configuration load failed, keeping previous configuration: {e}");
                Err(e)
            }
        }
    }

    /// Re-read every layer; same all-or-nothing swap as [`ConfigManager::load`]
    pub fn reload(&self) -> Result<Arc<AppConfig>> {
        info!("🔄 Reloading configuration");
        self.load()
    }

    /// The active configuration, `None` until the first successful load
    pub fn current(&self) -> Option<Arc<AppConfig>> {
        self.active
            .read()
            .as_ref()
            .map(|resolved| Arc::clone(&resolved.config))
    }

    pub fn state(&self) -> LoadState {
        *self.state.read()
    }

    /// Number of successful loads so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Layer that set `field` in the active configuration
    pub fn origin(&self, field: &str) -> Option<ConfigLayer> {
        self.active
            .read()
            .as_ref()
            .and_then(|resolved| resolved.origins.get(field).copied())
    }

    /// Non-fatal validation warnings of the active configuration
    pub fn warnings(&self) -> Vec<ValidationIssue> {
        self.active
            .read()
            .as_ref()
            .map(|resolved| resolved.warnings.clone())
            .unwrap_or_default()
    }

    fn resolve(&self) -> Result<Resolved> {
        let mut layered = Layered::from_defaults(default_table()?);
        let mut unknown = Vec::new();

        if let Some(file) = read_config_file(&self.options.config_path)? {
            for (path, value) in schema::leaves(&file) {
                if schema::field(&path).is_some() {
                    layered.apply(ConfigLayer::File, &path, value.clone());
                } else {
                    unknown.push(UnknownKey {
                        key: path,
                        layer: ConfigLayer::File,
                    });
                }
            }
        }

        let overrides = collect_overrides(self.env.vars(), &self.options.env_prefix);
        for (spec, value) in overrides.values {
            debug!(field = spec.path, "Environment override");
            layered.apply(ConfigLayer::Environment, spec.path, value);
        }
        unknown.extend(overrides.unknown.into_iter().map(|key| UnknownKey {
            key,
            layer: ConfigLayer::Environment,
        }));

        if !unknown.is_empty() {
            match self.options.unknown_keys {
                UnknownKeyPolicy::Reject => return Err(ConfigError::UnknownKeys { keys: unknown }),
                UnknownKeyPolicy::Warn => {
                    for key in &unknown {
                        warn!(key = %key.key, layer = %key.layer, "Ignoring unknown configuration key");
                    }
                }
            }
        }

        match validate_and_construct(layered.table()) {
            Ok(Validated { config, warnings }) => Ok(Resolved {
                config: Arc::new(config),
                origins: layered.into_origins(),
                warnings,
            }),
            Err(error) => {
                let fields = error
                    .issues
                    .into_iter()
                    .map(|issue| InvalidField {
                        layer: layered
                            .origin(&issue.field)
                            .unwrap_or(ConfigLayer::Defaults),
                        field: issue.field,
                        message: issue.message,
                    })
                    .collect();
                Err(ValidationFailure { fields }.into())
            }
        }
    }
}

/// Holds the state at `Loading` for one load; settles on `LoadFailed` unless
/// finished, including when the load unwinds
#[derive(Debug)]
struct LoadAttempt<'a> {
    state: &'a RwLock<LoadState>,
    outcome: LoadState,
}

impl<'a> LoadAttempt<'a> {
    fn begin(state: &'a RwLock<LoadState>) -> Self {
        *state.write() = LoadState::Loading;
        Self {
            state,
            outcome: LoadState::LoadFailed,
        }
    }

    fn finish(mut self, outcome: LoadState) {
        self.outcome = outcome;
    }
}

impl Drop for LoadAttempt<'_> {
    fn drop(&mut self) {
        *self.state.write() = self.outcome;
    }
}

/// Read and parse the config file.
///
/// `Ok(None)` when the file does not exist or holds nothing but whitespace.
fn read_config_file(path: &Path) -> Result<Option<toml::Table>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(None);
        }
        Err(source) => {
            return Err(ConfigError::FileRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if content.trim().is_empty() {
        info!(path = %path.display(), "Configuration file is empty, no overrides");
        return Ok(None);
    }

    toml::from_str::<toml::Table>(&content)
        .map(Some)
        .map_err(|source| ConfigError::FileParse {
            path: path.to_path_buf(),
            source,
        })
}
