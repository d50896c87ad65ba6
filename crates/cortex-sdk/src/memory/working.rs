//! Working Memory (Tier 1)
//!
//! Bounded FIFO store of recent conversations. Inserting a conversation past
//! capacity evicts the least recently active one inside the same transaction,
//! so the bound holds before the new id is returned. Queries scan the whole
//! set; with a capacity of a few dozen no index beyond recency is needed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WorkingMemoryConfig;
use crate::storage::{StorageLocation, TierStatus, TierStore};
use crate::utils::{content_hash, from_millis, to_millis};
use crate::{CortexError, CortexResult};

use super::migrations::WORKING_MEMORY_SQL;
use super::types::{Conversation, ConversationMetadata, Message, MessageRole, WorkingMemoryStats};

/// Receives conversations pushed out of working memory.
///
/// Called after the evicting transaction has committed; failures stay inside
/// the listener.
#[async_trait]
pub trait EvictionListener: Send + Sync {
    async fn on_evicted(&self, conversation: &Conversation);
}

/// Tier 1: bounded recent-conversation store
pub struct WorkingMemory {
    store: TierStore,
    capacity: usize,
    listener: Option<Arc<dyn EvictionListener>>,
}

impl WorkingMemory {
    /// Create a working memory tier (storage opens on first use)
    pub fn new(location: StorageLocation, config: &WorkingMemoryConfig) -> Self {
        Self {
            store: TierStore::new("working_memory", location, WORKING_MEMORY_SQL),
            capacity: config.capacity.max(1),
            listener: None,
        }
    }

    /// Forward evicted conversations to `listener`
    pub fn with_eviction_listener(mut self, listener: Arc<dyn EvictionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Maximum number of conversations held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current tier status
    pub fn status(&self) -> TierStatus {
        self.store.status()
    }

    /// Touch the backing store and report status
    pub async fn probe(&self) -> TierStatus {
        self.store.probe().await
    }

    /// Start a new conversation, evicting the least recently active one if full
    pub async fn start_conversation(&self, metadata: ConversationMetadata) -> CortexResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = to_millis(&Utc::now());
        let attributes_json = serde_json::to_string(&metadata.attributes)?;
        let capacity = self.capacity;

        let evicted = self
            .store
            .write(|conn| {
                let seq = next_activity_seq(conn)?;
                conn.execute(
                    "INSERT INTO conversations (id, title, namespace, metadata_json, started_at, last_active_at, activity_seq, message_count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, 0)",
                    params![&id, &metadata.title, &metadata.namespace, &attributes_json, now, seq],
                )?;

                let mut evicted = Vec::new();
                loop {
                    let count: usize =
                        conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
                    if count <= capacity {
                        break;
                    }

                    let oldest: String = conn.query_row(
                        "SELECT id FROM conversations ORDER BY activity_seq ASC LIMIT 1",
                        [],
                        |row| row.get(0),
                    )?;
                    if let Some(conversation) = load_conversation(conn, &oldest)? {
                        evicted.push(conversation);
                    }
                    conn.execute("DELETE FROM messages WHERE conversation_id = ?1", params![&oldest])?;
                    conn.execute("DELETE FROM conversations WHERE id = ?1", params![&oldest])?;
                }
                Ok(evicted)
            })
            .await?;

        debug!(conversation_id = %id, evicted = evicted.len(), "Started conversation");

        for conversation in &evicted {
            info!(
                conversation_id = %conversation.id,
                messages = conversation.message_count(),
                "Evicted conversation from working memory"
            );
            if let Some(listener) = &self.listener {
                listener.on_evicted(conversation).await;
            }
        }

        Ok(id)
    }

    /// Append a message to a conversation and mark it most recently active
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> CortexResult<Message> {
        let now = Utc::now();
        let hash = content_hash(content);

        self.store
            .write(|conn| {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM conversations WHERE id = ?1",
                        params![conversation_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !exists {
                    return Err(CortexError::not_found("Conversation", conversation_id));
                }

                conn.execute(
                    "INSERT INTO messages (conversation_id, role, content, content_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![conversation_id, role.as_str(), content, &hash, to_millis(&now)],
                )?;
                let message_id = conn.last_insert_rowid();

                let seq = next_activity_seq(conn)?;
                conn.execute(
                    "UPDATE conversations
                     SET last_active_at = ?1, activity_seq = ?2, message_count = message_count + 1
                     WHERE id = ?3",
                    params![to_millis(&now), seq, conversation_id],
                )?;

                Ok(Message {
                    id: message_id,
                    conversation_id: conversation_id.to_string(),
                    role,
                    content: content.to_string(),
                    content_hash: hash.clone(),
                    timestamp: now,
                })
            })
            .await
    }

    /// Get a conversation with its messages
    pub async fn get(&self, conversation_id: &str) -> CortexResult<Option<Conversation>> {
        self.store
            .read(|conn| load_conversation(conn, conversation_id))
            .await
    }

    /// The `n` most recently active conversations, newest first
    pub async fn query_recent(&self, n: usize) -> CortexResult<Vec<Conversation>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        self.store
            .read(|conn| {
                let ids: Vec<String> = {
                    let mut stmt = conn.prepare(
                        "SELECT id FROM conversations ORDER BY activity_seq DESC LIMIT ?1",
                    )?;
                    let rows = stmt.query_map(params![limit], |row| row.get(0))?;
                    rows.collect::<Result<_, _>>()?
                };

                let mut conversations = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(conversation) = load_conversation(conn, &id)? {
                        conversations.push(conversation);
                    }
                }
                Ok(conversations)
            })
            .await
    }

    /// Every held conversation matching `predicate`, newest first
    pub async fn search<P>(&self, predicate: P) -> CortexResult<Vec<Conversation>>
    where
        P: Fn(&Conversation) -> bool,
    {
        let all = self.query_recent(self.capacity).await?;
        Ok(all.into_iter().filter(|c| predicate(c)).collect())
    }

    /// Conversations whose title or messages mention `query`
    pub async fn search_text(&self, query: &str) -> CortexResult<Vec<Conversation>> {
        self.search(|c| c.mentions(query)).await
    }

    /// Number of conversations held
    pub async fn conversation_count(&self) -> CortexResult<usize> {
        self.store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?))
            .await
    }

    /// Statistics for reporting; zeroed if the store is unreachable
    pub async fn stats(&self) -> WorkingMemoryStats {
        let capacity = self.capacity;
        let result = self
            .store
            .read(|conn| {
                let (conversations, oldest, newest): (usize, Option<i64>, Option<i64>) = conn.query_row(
                    "SELECT COUNT(*), MIN(last_active_at), MAX(last_active_at) FROM conversations",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                let messages: usize =
                    conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;

                Ok(WorkingMemoryStats {
                    conversations,
                    messages,
                    capacity,
                    oldest_active_at: oldest.map(from_millis),
                    newest_active_at: newest.map(from_millis),
                })
            })
            .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Working memory stats unavailable");
            WorkingMemoryStats {
                capacity,
                ..Default::default()
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Private helpers
// ─────────────────────────────────────────────────────────────────────────────

fn next_activity_seq(conn: &Connection) -> CortexResult<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(activity_seq), 0) + 1 FROM conversations",
        [],
        |row| row.get(0),
    )?)
}

fn load_conversation(conn: &Connection, id: &str) -> CortexResult<Option<Conversation>> {
    let conversation = conn
        .query_row(
            "SELECT id, title, namespace, metadata_json, started_at, last_active_at
             FROM conversations WHERE id = ?1",
            params![id],
            row_to_conversation,
        )
        .optional()?;

    let Some(mut conversation) = conversation else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, content, content_hash, created_at
         FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
    )?;
    let messages = stmt.query_map(params![id], row_to_message)?;
    conversation.messages = messages.collect::<Result<_, _>>()?;

    Ok(Some(conversation))
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let metadata_json: String = row.get(3)?;
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        namespace: row.get(2)?,
        attributes: serde_json::from_str(&metadata_json).unwrap_or_default(),
        started_at: from_millis(row.get(4)?),
        last_active_at: from_millis(row.get(5)?),
        messages: Vec::new(),
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: MessageRole::from_str(&row.get::<_, String>(2)?).unwrap_or(MessageRole::User),
        content: row.get(3)?,
        content_hash: row.get(4)?,
        timestamp: from_millis(row.get(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    fn memory_with_capacity(capacity: usize) -> WorkingMemory {
        let config = WorkingMemoryConfig {
            capacity,
            ..Default::default()
        };
        WorkingMemory::new(StorageLocation::InMemory, &config)
    }

    #[derive(Default)]
    struct RecordingListener {
        evicted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EvictionListener for RecordingListener {
        async fn on_evicted(&self, conversation: &Conversation) {
            self.evicted.lock().await.push(conversation.id.clone());
        }
    }

    #[tokio::test]
    async fn test_start_and_append() {
        let memory = memory_with_capacity(20);
        let id = memory
            .start_conversation(ConversationMetadata::titled("refactor auth").in_namespace("workspace.app"))
            .await
            .unwrap();

        memory.append_message(&id, MessageRole::User, "split the module").await.unwrap();
        let reply = memory
            .append_message(&id, MessageRole::Assistant, "done")
            .await
            .unwrap();
        assert_eq!(reply.content_hash, content_hash("done"));

        let conversation = memory.get(&id).await.unwrap().unwrap();
        assert_eq!(conversation.title.as_deref(), Some("refactor auth"));
        assert_eq!(conversation.namespace.as_deref(), Some("workspace.app"));
        assert_eq!(conversation.message_count(), 2);
        assert_eq!(conversation.messages[0].role, MessageRole::User);
        assert_eq!(conversation.messages[1].content, "done");
        assert_eq!(memory.status(), TierStatus::Operational);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let memory = memory_with_capacity(20);
        let mut ids = Vec::new();
        for i in 0..25 {
            let id = memory
                .start_conversation(ConversationMetadata::titled(format!("conversation {}", i)))
                .await
                .unwrap();
            ids.push(id);
            assert!(memory.conversation_count().await.unwrap() <= 20);
        }

        assert_eq!(memory.conversation_count().await.unwrap(), 20);
        for evicted in &ids[..5] {
            assert!(memory.get(evicted).await.unwrap().is_none());
        }
        for kept in &ids[5..] {
            assert!(memory.get(kept).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_bound_holds_for_any_capacity() {
        for capacity in 1..=4 {
            let memory = memory_with_capacity(capacity);
            let mut first = None;
            for i in 0..=capacity {
                let id = memory.start_conversation(ConversationMetadata::default()).await.unwrap();
                if i == 0 {
                    first = Some(id);
                }
                assert!(memory.conversation_count().await.unwrap() <= capacity);
            }
            let first = first.unwrap();
            assert!(memory.get(&first).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_activity_refreshes_recency() {
        let memory = memory_with_capacity(3);
        let a = memory.start_conversation(ConversationMetadata::titled("a")).await.unwrap();
        let b = memory.start_conversation(ConversationMetadata::titled("b")).await.unwrap();
        let _c = memory.start_conversation(ConversationMetadata::titled("c")).await.unwrap();

        memory.append_message(&a, MessageRole::User, "still here").await.unwrap();
        let _d = memory.start_conversation(ConversationMetadata::titled("d")).await.unwrap();

        assert!(memory.get(&a).await.unwrap().is_some());
        assert!(memory.get(&b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_to_unknown_conversation() {
        let memory = memory_with_capacity(5);
        let err = memory
            .append_message("missing", MessageRole::User, "hello")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(memory.status(), TierStatus::Operational);
    }

    #[tokio::test]
    async fn test_eviction_listener_receives_conversation() {
        let listener = Arc::new(RecordingListener::default());
        let memory = memory_with_capacity(2).with_eviction_listener(listener.clone());

        let first = memory.start_conversation(ConversationMetadata::titled("first")).await.unwrap();
        memory.append_message(&first, MessageRole::User, "note this").await.unwrap();
        memory.start_conversation(ConversationMetadata::default()).await.unwrap();
        memory.start_conversation(ConversationMetadata::default()).await.unwrap();

        let evicted = listener.evicted.lock().await;
        assert_eq!(evicted.as_slice(), &[first]);
    }

    #[tokio::test]
    async fn test_query_recent_and_search() {
        let memory = memory_with_capacity(10);
        let older = memory.start_conversation(ConversationMetadata::titled("database migration")).await.unwrap();
        let newer = memory.start_conversation(ConversationMetadata::titled("ui polish")).await.unwrap();
        memory.append_message(&newer, MessageRole::User, "tweak the Button colors").await.unwrap();

        let recent = memory.query_recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, newer);

        let hits = memory.search_text("button").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, newer);

        let titled = memory
            .search(|c| c.title.as_deref() == Some("database migration"))
            .await
            .unwrap();
        assert_eq!(titled[0].id, older);

        let empty = memory.search(|c| c.message_count() > 5).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let memory = memory_with_capacity(4);
        let id = memory.start_conversation(ConversationMetadata::default()).await.unwrap();
        memory.append_message(&id, MessageRole::User, "one").await.unwrap();
        memory.append_message(&id, MessageRole::Assistant, "two").await.unwrap();

        let stats = memory.stats().await;
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.capacity, 4);
        assert!(stats.newest_active_at.is_some());
    }

    #[tokio::test]
    async fn test_stats_on_unreachable_store_are_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let memory = WorkingMemory::new(
            StorageLocation::File(dir.path().to_path_buf()),
            &WorkingMemoryConfig::default(),
        );

        let stats = memory.stats().await;
        assert_eq!(stats.conversations, 0);
        assert_eq!(stats.capacity, 20);
        assert_eq!(memory.status(), TierStatus::Degraded);
    }
}
