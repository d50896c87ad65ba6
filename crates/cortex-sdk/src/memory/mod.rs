//! Tiered Memory System
//!
//! Three storage tiers with different retention policies:
//! - Working memory (tier 1): the last N conversations, FIFO by activity
//! - Knowledge graph (tier 2): patterns whose confidence decays over time
//! - Context (tier 3): project indicators derived from injected signals
//!
//! # Architecture
//!
//! Each tier owns a single `TierStore` and is the only writer to it.
//! Conversations evicted from working memory can flow one way into the
//! knowledge graph through `ConversationPromoter`.

mod context;
mod knowledge;
mod promotion;
mod types;
mod working;

pub mod migrations;

pub use context::{
    analyze, classify_file_stability, classify_with_thresholds, CommitRecord, ContextSnapshot,
    ContextTier, FileStability, FileStabilityEntry, ProjectSignals, TestHealth, TestRunRecord,
    STABLE_CHURN_THRESHOLD, VOLATILE_CHURN_THRESHOLD,
};
pub use knowledge::KnowledgeGraph;
pub use promotion::ConversationPromoter;
pub use types::{
    clamp_confidence, Conversation, ConversationMetadata, DecayReport, KnowledgeGraphStats,
    Message, MessageRole, NamespaceScope, Pattern, PatternHit, PatternState, PatternUpsert,
    Relationship, RelationshipKind, WorkingMemoryStats,
};
pub use working::{EvictionListener, WorkingMemory};
