//! Project context commands.

use anyhow::{Context, Result};
use colored::Colorize;
use cortex_sdk::memory::{FileStability, ProjectSignals, TestHealth};

use crate::cli::{ContextAction, ContextCommand};
use crate::config::Config;

/// Execute context command.
pub async fn execute(cmd: ContextCommand, config: &Config) -> Result<()> {
    let cortex = super::open(config)?;
    let tier = cortex.context();

    match cmd.action {
        ContextAction::Capture { signals, json } => {
            let content = std::fs::read_to_string(&signals)
                .with_context(|| format!("Failed to read {}", signals.display()))?;
            let signals: ProjectSignals =
                serde_json::from_str(&content).context("Failed to parse signals file")?;

            let snapshot = tier.capture(&signals).await.context("Failed to store snapshot")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                return Ok(());
            }

            println!("{} Captured snapshot {}", "✓".green(), snapshot.id.dimmed());
            println!(
                "  Commits: {} in {} days ({:.1}/week)",
                snapshot.commit_count, snapshot.window_days, snapshot.commits_per_week
            );
            println!(
                "  Files: {} stable, {} unstable, {} volatile",
                snapshot.count(FileStability::Stable),
                snapshot.count(FileStability::Unstable),
                snapshot.count(FileStability::Volatile)
            );
            for file in snapshot.volatile_files() {
                println!("    {} {} ({:.0}%)", "!".red(), file.path, file.churn_ratio * 100.0);
            }

            let health = match snapshot.test_health {
                TestHealth::Healthy => "healthy".green(),
                TestHealth::Warning => "warning".yellow(),
                TestHealth::Failing => "failing".red(),
                TestHealth::Unknown => "unknown".dimmed(),
            };
            match snapshot.test_pass_rate {
                Some(rate) => println!("  Tests: {} ({:.1}% passing)", health, rate * 100.0),
                None => println!("  Tests: {}", health),
            }
        }

        ContextAction::Classify { ratio } => {
            println!("{}", tier.classify(ratio));
        }
    }

    Ok(())
}
