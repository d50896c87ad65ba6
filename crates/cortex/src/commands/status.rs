//! Status dashboard command.
//!
//! Shows the weighted health score, per-tier status and tier usage. The JSON
//! form is the metric bundle consumed by report templates.

use anyhow::Result;
use colored::Colorize;
use cortex_sdk::health::{render_report, HealthComponent, HealthSummaryTemplate};
use cortex_sdk::{HealthGrade, TierStatus};

use crate::config::Config;

pub async fn execute(json: bool, config: &Config) -> Result<()> {
    let cortex = super::open(config)?;
    let bundle = cortex.health().build_metric_bundle().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    let health = cortex.health().compute_health().await;
    let grade = match health.grade {
        HealthGrade::Excellent => health.grade.as_str().green(),
        HealthGrade::Good => health.grade.as_str().cyan(),
        HealthGrade::Fair => health.grade.as_str().yellow(),
        HealthGrade::Poor => health.grade.as_str().red(),
    };

    println!("{}", "Cortex Status".bold());
    println!("  Config: {}", config.source.display().to_string().dimmed());
    println!("  Health: {}/100 ({})", health.score, grade);
    println!();

    for component in HealthComponent::ALL {
        let status = health.status_of(component).unwrap_or(TierStatus::Uninitialized);
        let marker = if status.is_operational() {
            "●".green()
        } else {
            "●".red()
        };
        println!(
            "  {} {:<16} {:<14} weight {}",
            marker,
            component.as_str(),
            status.as_str(),
            component.weight()
        );
    }

    println!();
    println!("{}", render_report(&HealthSummaryTemplate, &bundle).body);

    for warning in &health.warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }
    for recommendation in &health.recommendations {
        println!("  {} {}", "→".cyan(), recommendation);
    }

    Ok(())
}
