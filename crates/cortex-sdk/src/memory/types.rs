//! Memory Type Definitions
//!
//! Defines the core types for working memory (tier 1) and the knowledge
//! graph (tier 2).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Working memory
// ─────────────────────────────────────────────────────────────────────────────

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            "tool" => Some(Self::Tool),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single message inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied metadata for a new conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationMetadata {
    /// Optional human-readable title
    pub title: Option<String>,
    /// Knowledge namespace the conversation belongs to
    pub namespace: Option<String>,
    /// Free-form attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ConversationMetadata {
    /// Metadata with a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Set the namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A conversation held in working memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub namespace: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Number of messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// First message sent by `role`, if any
    pub fn first_message_from(&self, role: MessageRole) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == role)
    }

    /// Whether any message contains `needle` (case-insensitive)
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&needle))
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(&needle))
    }
}

/// Working memory statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingMemoryStats {
    pub conversations: usize,
    pub messages: usize,
    pub capacity: usize,
    pub oldest_active_at: Option<DateTime<Utc>>,
    pub newest_active_at: Option<DateTime<Utc>>,
}

impl WorkingMemoryStats {
    /// Fraction of capacity in use
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.conversations as f64 / self.capacity as f64
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge graph
// ─────────────────────────────────────────────────────────────────────────────

/// Clamp a confidence value into [0, 1], rounded to 4 decimal places.
///
/// NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let clamped = value.clamp(0.0, 1.0);
    (clamped * 10_000.0).round() / 10_000.0
}

/// Lifecycle state of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternState {
    Active,
    Archived,
}

impl PatternState {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// A learned pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub occurrence_count: u32,
    pub namespace: String,
    pub protected: bool,
    pub state: PatternState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_decayed_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Pattern {
    /// Whether the pattern has been archived
    pub fn is_archived(&self) -> bool {
        self.state == PatternState::Archived
    }
}

/// Input for inserting or reinforcing a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternUpsert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub namespace: String,
    pub protected: bool,
}

impl PatternUpsert {
    /// Create an upsert with confidence 0.5
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            confidence: 0.5,
            namespace: namespace.into(),
            protected: false,
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the confidence (clamped on write)
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Mark as protected from decay and archival
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }
}

/// Which namespace bucket a search hit came from, in rank order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceScope {
    /// The caller's own namespace
    Current,
    /// The shared/generic namespace
    Shared,
    /// Any other namespace
    Other,
}

/// A ranked search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternHit {
    pub pattern: Pattern,
    pub scope: NamespaceScope,
    pub relevance: f64,
}

/// Typed edge label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    RelatedTo,
    DependsOn,
    CoModifiedWith,
    DerivedFrom,
    Supersedes,
    AppliesTo,
}

impl RelationshipKind {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "related_to" => Some(Self::RelatedTo),
            "depends_on" => Some(Self::DependsOn),
            "co_modified_with" => Some(Self::CoModifiedWith),
            "derived_from" => Some(Self::DerivedFrom),
            "supersedes" => Some(Self::Supersedes),
            "applies_to" => Some(Self::AppliesTo),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatedTo => "related_to",
            Self::DependsOn => "depends_on",
            Self::CoModifiedWith => "co_modified_with",
            Self::DerivedFrom => "derived_from",
            Self::Supersedes => "supersedes",
            Self::AppliesTo => "applies_to",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An edge between two known nodes (patterns or files)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationshipKind,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one decay pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayReport {
    /// Active, unprotected patterns looked at
    pub examined: usize,
    /// Patterns whose confidence was reduced
    pub decayed: usize,
    /// Patterns archived by this pass
    pub archived: Vec<String>,
    /// Protected patterns left untouched
    pub skipped_protected: usize,
}

/// Knowledge graph statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraphStats {
    pub total_patterns: usize,
    pub active_patterns: usize,
    pub archived_patterns: usize,
    pub protected_patterns: usize,
    pub relationships: usize,
    pub file_nodes: usize,
    pub average_confidence: f64,
    pub patterns_by_namespace: BTreeMap<String, usize>,
}
