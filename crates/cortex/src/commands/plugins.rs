//! Plugin listing.

use anyhow::Result;
use colored::Colorize;

use crate::cli::{PluginsAction, PluginsCommand};
use crate::config::Config;

/// Execute plugins command.
pub async fn execute(cmd: PluginsCommand, config: &Config) -> Result<()> {
    let cortex = super::open_with_plugins(config).await?;

    match cmd.action {
        PluginsAction::List { json } => {
            let plugins = cortex.plugins().list().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&plugins)?);
                return Ok(());
            }

            println!("{}", "Plugins".bold());
            for info in &plugins {
                let meta = &info.metadata;
                let state = if info.enabled {
                    "enabled".green()
                } else {
                    "disabled".dimmed()
                };
                let hooks: Vec<&str> = meta.hooks.iter().map(|h| h.as_str()).collect();
                println!(
                    "  {:<22} {:<10} {:<8} {}",
                    meta.id.cyan(),
                    meta.priority.as_str(),
                    state,
                    hooks.join(", ")
                );
                if !meta.description.is_empty() {
                    println!("  {}", meta.description.dimmed());
                }
            }
        }
    }

    Ok(())
}
