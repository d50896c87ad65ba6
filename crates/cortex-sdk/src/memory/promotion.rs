//! Conversation promotion
//!
//! Turns conversations evicted from working memory into low-confidence
//! knowledge graph patterns, so the gist of an old conversation survives the
//! FIFO bound.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::knowledge::KnowledgeGraph;
use super::types::{Conversation, MessageRole, PatternUpsert};
use super::working::EvictionListener;

const TITLE_CHARS: usize = 80;
const DESCRIPTION_CHARS: usize = 280;

/// Promotes evicted conversations into the knowledge graph
pub struct ConversationPromoter {
    graph: Arc<KnowledgeGraph>,
    min_messages: usize,
}

impl ConversationPromoter {
    pub fn new(graph: Arc<KnowledgeGraph>, min_messages: usize) -> Self {
        Self { graph, min_messages }
    }

    /// Build the pattern for a conversation, or `None` if it is too short
    pub fn pattern_for(&self, conversation: &Conversation) -> Option<PatternUpsert> {
        if conversation.message_count() < self.min_messages {
            return None;
        }

        let opening = conversation
            .first_message_from(MessageRole::User)
            .or_else(|| conversation.messages.first())
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();

        let title = conversation
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| truncate_chars(&opening, TITLE_CHARS));
        if title.trim().is_empty() {
            return None;
        }

        let config = self.graph.config();
        let namespace = conversation
            .namespace
            .clone()
            .unwrap_or_else(|| config.shared_namespace.clone());

        Some(
            PatternUpsert::new(format!("conversation.{}", conversation.id), title, namespace)
                .description(truncate_chars(&opening, DESCRIPTION_CHARS))
                .confidence(config.promotion_confidence),
        )
    }
}

#[async_trait]
impl EvictionListener for ConversationPromoter {
    async fn on_evicted(&self, conversation: &Conversation) {
        let Some(pattern) = self.pattern_for(conversation) else {
            debug!(
                conversation_id = %conversation.id,
                messages = conversation.message_count(),
                "Evicted conversation too short to promote"
            );
            return;
        };

        match self.graph.upsert_pattern(pattern).await {
            Ok(pattern) => debug!(pattern_id = %pattern.id, "Promoted evicted conversation"),
            Err(e) => warn!(
                conversation_id = %conversation.id,
                error = %e,
                "Failed to promote evicted conversation"
            ),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KnowledgeGraphConfig, WorkingMemoryConfig};
    use crate::memory::types::ConversationMetadata;
    use crate::memory::working::WorkingMemory;
    use crate::rules::RuleBook;
    use crate::storage::StorageLocation;

    fn graph() -> Arc<KnowledgeGraph> {
        Arc::new(KnowledgeGraph::new(
            StorageLocation::InMemory,
            &KnowledgeGraphConfig::default(),
            Arc::new(RuleBook::default()),
        ))
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
    }

    #[tokio::test]
    async fn test_evicted_conversations_are_promoted() {
        let graph = graph();
        let promoter = Arc::new(ConversationPromoter::new(Arc::clone(&graph), 2));
        let config = WorkingMemoryConfig {
            capacity: 1,
            ..Default::default()
        };
        let memory = WorkingMemory::new(StorageLocation::InMemory, &config).with_eviction_listener(promoter);

        let first = memory
            .start_conversation(ConversationMetadata::default().in_namespace("app"))
            .await
            .unwrap();
        memory
            .append_message(&first, MessageRole::User, "How should errors be wrapped?")
            .await
            .unwrap();
        memory
            .append_message(&first, MessageRole::Assistant, "Use thiserror enums.")
            .await
            .unwrap();

        let short = memory.start_conversation(ConversationMetadata::titled("short")).await.unwrap();
        memory.start_conversation(ConversationMetadata::default()).await.unwrap();

        let promoted = graph
            .get_pattern(&format!("conversation.{}", first))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(promoted.namespace, "app");
        assert_eq!(promoted.title, "How should errors be wrapped?");
        assert_eq!(promoted.confidence, 0.5);

        // Fewer than two messages: dropped silently.
        assert!(graph
            .get_pattern(&format!("conversation.{}", short))
            .await
            .unwrap()
            .is_none());
    }
}
