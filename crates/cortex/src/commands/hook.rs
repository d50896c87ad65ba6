//! Fire lifecycle events at registered plugins.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use cortex_sdk::plugins::DispatchRecord;
use cortex_sdk::HookEvent;
use serde_json::Value;

use crate::cli::{HookAction, HookCommand};
use crate::config::Config;

/// Execute hook command.
pub async fn execute(cmd: HookCommand, config: &Config) -> Result<()> {
    match cmd.action {
        HookAction::Fire { event, data, json } => {
            let Some(event) = HookEvent::from_str(&event) else {
                let known: Vec<&str> = HookEvent::ALL.iter().map(|e| e.as_str()).collect();
                bail!("Unknown event: {}. Known events: {}", event, known.join(", "));
            };
            let data = parse_data(data.as_deref())?;

            let cortex = super::open_with_plugins(config).await?;
            let records = cortex.dispatch(event, data).await;
            cortex.plugins().shutdown_all().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_records(event, &records);
            }

            if records.iter().any(|r| !r.is_ok()) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn parse_data(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let value: Value = serde_json::from_str(raw).context("Event data must be valid JSON")?;
    if !value.is_object() {
        bail!("Event data must be a JSON object");
    }
    Ok(value)
}

fn print_records(event: HookEvent, records: &[DispatchRecord]) {
    if records.is_empty() {
        println!("{} No enabled plugins subscribe to {}", "·".dimmed(), event);
        return;
    }

    println!("{} {}", "Dispatched".bold(), event.to_string().cyan());
    for record in records {
        match &record.outcome {
            Ok(_) => println!(
                "  {} {} {}",
                "✓".green(),
                record.plugin_id,
                format!("{}ms", record.duration_ms).dimmed()
            ),
            Err(e) => println!("  {} {} {}", "✗".red(), record.plugin_id, e.to_string().red()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data() {
        assert_eq!(parse_data(None).unwrap(), Value::Null);
        assert_eq!(
            parse_data(Some(r#"{"conversation_id": "abc"}"#)).unwrap()["conversation_id"],
            "abc"
        );
        assert!(parse_data(Some("[1, 2]")).is_err());
        assert!(parse_data(Some("{oops")).is_err());
    }
}
