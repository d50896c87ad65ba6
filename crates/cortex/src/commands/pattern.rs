//! Knowledge graph commands.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use cortex_sdk::memory::{NamespaceScope, PatternUpsert, RelationshipKind};

use crate::cli::{PatternAction, PatternCommand};
use crate::config::Config;

/// Execute pattern command.
pub async fn execute(cmd: PatternCommand, config: &Config) -> Result<()> {
    let cortex = super::open(config)?;
    let graph = cortex.knowledge_graph();

    match cmd.action {
        PatternAction::Upsert {
            id,
            title,
            namespace,
            description,
            confidence,
            protected,
        } => {
            let mut input = PatternUpsert::new(id, title, namespace);
            if let Some(description) = description {
                input = input.description(description);
            }
            if let Some(confidence) = confidence {
                input = input.confidence(confidence);
            }
            if protected {
                input = input.protected();
            }

            let pattern = graph.upsert_pattern(input).await.context("Failed to upsert pattern")?;
            println!("{} Stored pattern {}", "✓".green(), pattern.id.cyan());
            println!("  Confidence: {:.4}", pattern.confidence);
            println!("  Occurrences: {}", pattern.occurrence_count);
            if pattern.protected {
                println!("  {}", "protected".yellow());
            }
        }

        PatternAction::Search { query, namespace, json } => {
            let hits = graph.search_patterns(&query, &namespace).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
                return Ok(());
            }
            if hits.is_empty() {
                println!("{}", "No patterns found".dimmed());
                return Ok(());
            }
            for hit in &hits {
                let scope = match hit.scope {
                    NamespaceScope::Current => "current".green(),
                    NamespaceScope::Shared => "shared".cyan(),
                    NamespaceScope::Other => "other".dimmed(),
                };
                println!(
                    "[{}] {} {} (confidence {:.2}, relevance {:.2})",
                    scope,
                    hit.pattern.id.bold(),
                    hit.pattern.title,
                    hit.pattern.confidence,
                    hit.relevance
                );
            }
        }

        PatternAction::Decay { at } => {
            let now = match at {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .with_context(|| format!("Invalid timestamp: {}", raw))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };

            let report = graph.decay_pass(now).await.context("Decay pass failed")?;
            println!("{} Decay pass complete", "✓".green());
            println!("  Examined: {}", report.examined);
            println!("  Decayed: {}", report.decayed);
            println!("  Protected: {}", report.skipped_protected);
            if report.archived.is_empty() {
                println!("  Archived: 0");
            } else {
                println!("  Archived: {}", report.archived.join(", ").yellow());
            }
        }

        PatternAction::Link { source, target, kind } => {
            let Some(kind) = RelationshipKind::from_str(&kind) else {
                bail!(
                    "Invalid relationship kind: {}. Use: related_to, depends_on, co_modified_with, derived_from, supersedes, or applies_to",
                    kind
                );
            };

            let edge = graph
                .add_relationship(&source, &target, kind)
                .await
                .context("Failed to link nodes")?;
            println!(
                "{} {} {} {}",
                "✓".green(),
                edge.source_id,
                format!("-[{}]->", edge.kind).cyan(),
                edge.target_id
            );
        }
    }

    Ok(())
}
