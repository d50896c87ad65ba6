use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::memory::MessageRole;
use crate::plugins::{
    DispatchContext, HookEvent, Plugin, PluginCategory, PluginError, PluginMetadata,
    PluginPriority, PluginResult,
};

/// Closes out a conversation in working memory.
///
/// Needs a `conversation_id` field in the event data. Appends a system note
/// and reports working memory usage.
#[derive(Debug, Default)]
pub struct ConversationArchivePlugin;

impl ConversationArchivePlugin {
    pub const ID: &'static str = "conversation-archive";
    pub const KIND: &'static str = "conversation-archive";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for ConversationArchivePlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(Self::ID, "Conversation archive", env!("CARGO_PKG_VERSION"))
            .description("Marks finished conversations and reports working memory usage")
            .category(PluginCategory::Memory)
            .priority(PluginPriority::Low)
            .hook(HookEvent::OnConversationEnd)
    }

    async fn execute(&self, ctx: &DispatchContext) -> PluginResult<Value> {
        let tiers = ctx.require_tiers()?;
        let conversation_id = ctx
            .data_str("conversation_id")
            .ok_or_else(|| PluginError::failed("missing 'conversation_id' in event data"))?;

        let note = tiers
            .working_memory
            .append_message(conversation_id, MessageRole::System, "Conversation closed")
            .await?;
        let stats = tiers.working_memory.stats().await;

        debug!(conversation_id, message_id = %note.id, "Conversation archived");

        Ok(json!({
            "conversation_id": conversation_id,
            "conversations": stats.conversations,
            "capacity": stats.capacity,
            "utilization": stats.utilization(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ConversationMetadata;
    use crate::tiers::Tiers;

    #[tokio::test]
    async fn test_appends_closing_note() {
        let tiers = Tiers::in_memory();
        let id = tiers
            .working_memory
            .start_conversation(ConversationMetadata::titled("Refactor parser"))
            .await
            .unwrap();

        let ctx = DispatchContext::builder(HookEvent::OnConversationEnd)
            .data("conversation_id", json!(id))
            .tiers(tiers.clone())
            .build();
        let result = ConversationArchivePlugin::new().execute(&ctx).await.unwrap();
        assert_eq!(result["conversations"], 1);
        assert_eq!(result["capacity"], 20);

        let conversation = tiers.working_memory.get(&id).await.unwrap().unwrap();
        let last = conversation.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::System);
        assert_eq!(last.content, "Conversation closed");
    }

    #[tokio::test]
    async fn test_unknown_conversation_fails() {
        let ctx = DispatchContext::builder(HookEvent::OnConversationEnd)
            .data("conversation_id", json!("missing"))
            .tiers(Tiers::in_memory())
            .build();
        assert!(ConversationArchivePlugin::new().execute(&ctx).await.is_err());

        let ctx = DispatchContext::builder(HookEvent::OnConversationEnd)
            .tiers(Tiers::in_memory())
            .build();
        assert!(ConversationArchivePlugin::new().execute(&ctx).await.is_err());
    }
}
