//! Working memory commands.
//!
//! Conversations live in the local database; starting one past capacity
//! evicts the least recently active conversation.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use cortex_sdk::{Conversation, ConversationMetadata, MessageRole};

use crate::cli::{MemoryAction, MemoryCommand};
use crate::config::Config;

/// Execute memory command.
pub async fn execute(cmd: MemoryCommand, config: &Config) -> Result<()> {
    let cortex = super::open(config)?;
    let memory = cortex.working_memory();

    match cmd.action {
        MemoryAction::Start { title, namespace } => {
            let mut metadata = ConversationMetadata {
                title,
                ..Default::default()
            };
            if let Some(namespace) = namespace {
                metadata = metadata.in_namespace(namespace);
            }

            let id = memory
                .start_conversation(metadata)
                .await
                .context("Failed to start conversation")?;
            let count = memory.conversation_count().await?;

            println!("{} Started conversation", "✓".green());
            println!("  ID: {}", id.cyan());
            println!("  Working memory: {}/{}", count, memory.capacity());
        }

        MemoryAction::Append {
            conversation_id,
            content,
            role,
        } => {
            let Some(role) = MessageRole::from_str(&role) else {
                bail!("Invalid role: {}. Use: user, assistant, system, or tool", role);
            };
            let message = memory
                .append_message(&conversation_id, role, &content)
                .await
                .context("Failed to append message")?;
            println!("{} Appended {} message #{}", "✓".green(), role.as_str().cyan(), message.id);
        }

        MemoryAction::Recent { limit, json } => {
            let conversations = memory.query_recent(limit).await?;
            print_conversations(&conversations, json)?;
        }

        MemoryAction::Search { query, json } => {
            let conversations = memory.search_text(&query).await?;
            print_conversations(&conversations, json)?;
        }
    }

    Ok(())
}

fn print_conversations(conversations: &[Conversation], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!("{}", "No conversations found".dimmed());
        return Ok(());
    }

    for conversation in conversations {
        let title = conversation.title.as_deref().unwrap_or("(untitled)");
        println!(
            "{} {} {}",
            conversation.id.dimmed(),
            title.bold(),
            format!("({} messages)", conversation.message_count()).dimmed()
        );
        println!(
            "    last active {}",
            conversation.last_active_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
