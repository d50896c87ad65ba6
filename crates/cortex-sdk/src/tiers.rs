//! Shared tier handles
//!
//! One instance of each tier per host, plus the rule book. Cloning `Tiers`
//! clones the `Arc`s, so plugins and the health aggregator see the same
//! stores the host writes to.

use std::sync::Arc;

use tracing::warn;

use crate::config::CortexConfig;
use crate::memory::{ContextTier, ConversationPromoter, KnowledgeGraph, WorkingMemory};
use crate::rules::RuleBook;
use crate::storage::StorageLocation;

/// Handles to every tier
#[derive(Clone)]
pub struct Tiers {
    pub rules: Arc<RuleBook>,
    pub working_memory: Arc<WorkingMemory>,
    pub knowledge_graph: Arc<KnowledgeGraph>,
    pub context: Arc<ContextTier>,
}

impl Tiers {
    /// Build every tier from configuration.
    ///
    /// Storage is opened lazily by each tier. An unreadable rule book leaves
    /// the tier-0 component empty instead of failing.
    pub fn from_config(config: &CortexConfig) -> Self {
        let rules = match RuleBook::load_or_builtin(config.rules_path.as_deref()) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Failed to load rule book; tier-0 rules unavailable");
                RuleBook::default()
            }
        };
        Self::with_rules(config, rules)
    }

    /// Build every tier with an explicit rule book
    pub fn with_rules(config: &CortexConfig, rules: RuleBook) -> Self {
        let rules = Arc::new(rules);
        let location = StorageLocation::from_path(config.database_path.clone());

        let knowledge_graph = Arc::new(KnowledgeGraph::new(
            location.clone(),
            &config.knowledge_graph,
            Arc::clone(&rules),
        ));

        let mut working_memory = WorkingMemory::new(location.clone(), &config.working_memory);
        if config.working_memory.promote_evicted {
            working_memory = working_memory.with_eviction_listener(Arc::new(ConversationPromoter::new(
                Arc::clone(&knowledge_graph),
                config.working_memory.min_messages_for_promotion,
            )));
        }

        let context = Arc::new(ContextTier::new(location, &config.context));

        Self {
            rules,
            working_memory: Arc::new(working_memory),
            knowledge_graph,
            context,
        }
    }

    /// In-memory tiers with the built-in rule book
    pub fn in_memory() -> Self {
        Self::with_rules(&CortexConfig::in_memory(), RuleBook::builtin())
    }
}
