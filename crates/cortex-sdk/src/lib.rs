//! Cortex SDK - Tiered memory and lifecycle plugins for a coding assistant
//!
//! The SDK gives an assistant a layered memory and a plugin bus:
//!
//! # Memory tiers
//!
//! - **tier 0** - read-only rule book: tier-0 rules and decay-protected patterns
//! - **tier 1** - working memory: the last N conversations, oldest evicted first
//! - **tier 2** - knowledge graph: patterns whose confidence decays unless
//!   reinforced, plus relationships between patterns and files
//! - **tier 3** - context: commit and test signals reduced to file stability
//!   and test health snapshots
//!
//! # Health
//!
//! - **health** - weighted health score over all tiers and schema-versioned
//!   metric bundles for report templates
//!
//! # Plugins
//!
//! - **plugins** - priority-ordered dispatch of lifecycle events with
//!   per-plugin time budgets, cancellation and failure isolation
//!
//! # Example
//!
//! ```rust,no_run
//! use cortex_sdk::{ConversationMetadata, Cortex, CortexConfig, HookEvent, MessageRole};
//! use serde_json::json;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let cortex = Cortex::open(CortexConfig::new("cortex.db"))?;
//!     cortex.register_builtin_plugins().await?;
//!
//!     let id = cortex
//!         .working_memory()
//!         .start_conversation(ConversationMetadata::titled("Fix login redirect"))
//!         .await?;
//!     cortex
//!         .working_memory()
//!         .append_message(&id, MessageRole::User, "The redirect loops after logout")
//!         .await?;
//!
//!     cortex
//!         .dispatch(HookEvent::OnConversationEnd, json!({ "conversation_id": id }))
//!         .await;
//!
//!     let health = cortex.health().compute_health().await;
//!     println!("health: {} ({})", health.score, health.grade);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod health;
pub mod memory;
pub mod plugins;
pub mod rules;
pub mod storage;
pub mod tiers;
pub mod utils;

mod error;
mod sdk;

pub use config::{
    ContextConfig, CortexConfig, DecayMode, DispatchConfig, KnowledgeGraphConfig,
    WorkingMemoryConfig,
};
pub use error::{CortexError, CortexResult};
pub use sdk::Cortex;
pub use storage::{StorageLocation, TierStatus};
pub use tiers::Tiers;

pub use health::{HealthAggregator, HealthGrade, HealthScore, MetricBundle};
pub use memory::{
    ContextSnapshot, ContextTier, Conversation, ConversationMetadata, FileStability,
    KnowledgeGraph, Message, MessageRole, Pattern, PatternUpsert, ProjectSignals, WorkingMemory,
};
pub use plugins::{
    DispatchContext, DispatchRecord, HookEvent, Plugin, PluginBuilder, PluginMetadata,
    PluginPriority, PluginRegistry,
};
pub use rules::RuleBook;
