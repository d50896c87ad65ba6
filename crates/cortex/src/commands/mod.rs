//! Command implementations for the cortex CLI.
//!
//! Each submodule implements the logic for a command group.

use anyhow::{Context, Result};
use colored::Colorize;
use cortex_sdk::plugins::PluginCatalog;
use cortex_sdk::Cortex;
use tracing::debug;

use crate::config::Config;

pub mod context;
pub mod hook;
pub mod memory;
pub mod pattern;
pub mod plugins;
pub mod status;

/// Open the tiers without plugins.
pub fn open(config: &Config) -> Result<Cortex> {
    config.ensure_dirs()?;
    Cortex::open(config.cortex.clone()).context("Failed to open cortex")
}

/// Open the tiers and register built-in and manifest plugins.
pub async fn open_with_plugins(config: &Config) -> Result<Cortex> {
    let cortex = open(config)?;
    cortex
        .register_builtin_plugins()
        .await
        .context("Failed to register built-in plugins")?;

    let report = cortex.load_plugins(&PluginCatalog::with_builtins()).await;
    debug!(loaded = report.loaded.len(), failed = report.failed.len(), "Loaded plugin manifests");
    for (path, error) in &report.failed {
        eprintln!("{} Skipped manifest {}: {}", "⚠".yellow(), path.display(), error);
    }

    Ok(cortex)
}
