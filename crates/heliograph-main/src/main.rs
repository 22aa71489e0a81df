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

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use heliograph_config::{ConfigManager, ManagerOptions, env_vars};
use heliograph_storage::{Database, SqliteRepository, TelemetryRepository};
use heliograph_types::{AppConfig, defaults, render_documented};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const CONFIG_PATH_VAR: &str = "HELIOGRAPH_CONFIG";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("{VERSION}");
                return Ok(());
            }
            "--print-defaults" => {
                print!("{}", render_documented(&defaults())?);
                return Ok(());
            }
            "--print-env" => {
                for (name, spec) in env_vars("") {
                    println!("{name:<32} {}", spec.path);
                }
                return Ok(());
            }
            "--check" => return check_config(),
            other => {
                anyhow::bail!("Unknown argument: {other} (see --help)");
            }
        }
    }

    run()
}

fn print_help() {
    println!("Heliograph - solar dashboard core");
    println!("Version: {VERSION}");
    println!();
    println!("Usage: heliograph [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -h, --help          Print this help message");
    println!("  -v, --version       Print version");
    println!("      --check         Validate the configuration and exit");
    println!("      --print-defaults Print the default configuration file");
    println!("      --print-env     List environment variable overrides");
    println!();
    println!("Environment:");
    println!("  {CONFIG_PATH_VAR}   Configuration file (default: config.toml)");
    println!("  RUST_LOG            Log filter, overrides logging.level");
}

fn config_manager() -> ConfigManager {
    let path = std::env::var_os(CONFIG_PATH_VAR)
        .map_or_else(|| PathBuf::from("config.toml"), PathBuf::from);
    ConfigManager::new(ManagerOptions::new(path))
}

fn check_config() -> Result<()> {
    let manager = config_manager();
    let config = manager.load().with_context(|| {
        format!(
            "Configuration {} is invalid",
            manager.options().config_path.display()
        )
    })?;

    for warning in manager.warnings() {
        println!("warning: {warning}");
    }
    println!(
        "Configuration OK ({} fields, battery {} kWh, dashboard on {})",
        heliograph_types::SCHEMA.len(),
        config.battery.capacity_kwh,
        config.dashboard.socket_address()
    );
    Ok(())
}

fn run() -> Result<()> {
    // Respects RUST_LOG; otherwise switched to logging.level once config is loaded
    let env_filter = EnvFilter::try_from_default_env();
    let from_env = env_filter.is_ok();
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter.unwrap_or_else(|_| EnvFilter::new("info")))
        .with_filter_reloading();
    let filter_handle = builder.reload_handle();
    tracing::subscriber::set_global_default(builder.finish())
        .context("Failed to install tracing subscriber")?;

    let manager = config_manager();
    let config = manager.load().context("Failed to load configuration")?;

    if !from_env
        && let Err(e) = filter_handle.reload(EnvFilter::new(config.logging.level.as_str()))
    {
        warn!("Failed to apply logging.level: {e}");
    }

    log_summary(&config);

    let db = Arc::new(Database::new(&config.database));
    db.init_db().context("Failed to initialize database")?;
    let repository = SqliteRepository::new(Arc::clone(&db), &config.database);

    repository
        .upsert_status(
            "heliograph.startup",
            &json!({
                "version": VERSION,
                "started_at": Utc::now().to_rfc3339(),
                "config_generation": manager.generation(),
            }),
        )
        .context("Failed to record startup status")?;

    let purged = repository
        .purge_expired(Utc::now())
        .context("Failed to purge expired readings")?;

    for subsystem in ["solar", "battery", "grid"] {
        match repository.latest(subsystem)? {
            Some(reading) => info!(
                "   Latest {subsystem}: {} ({} metrics)",
                reading.timestamp(),
                reading.values.len()
            ),
            None => info!("   Latest {subsystem}: no readings yet"),
        }
    }

    info!(purged, "✅ Heliograph core ready");
    Ok(())
}

fn log_summary(config: &AppConfig) {
    info!("🚀 Starting Heliograph {VERSION}");
    info!("📋 Configuration Summary:");
    info!(
        "   Solar: {} kWp from {:?}, polled every {}s",
        config.solar.peak_power_kw, config.solar.source, config.solar.poll_interval_secs
    );
    info!(
        "   Battery: {} kWh ({:.1} kWh usable), SOC {}%-{}%, mode {:?}",
        config.battery.capacity_kwh,
        config.battery.usable_energy_kwh(),
        config.battery.min_soc,
        config.battery.max_soc,
        config.battery.mode
    );
    info!(
        "   Grid: export {}W, import {}W, {:?} tariff in {:?}",
        config.grid.max_export_w,
        config.grid.max_import_w,
        config.grid.tariff,
        config.grid.currency
    );
    info!("   Dashboard: {}", config.dashboard.socket_address());
    info!(
        "   Database: {} (retention {} days)",
        config.database.path, config.database.retention_days
    );
}
