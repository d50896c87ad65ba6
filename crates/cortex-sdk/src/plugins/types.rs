//! Plugin Type Definitions

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::{validate_id, validate_version};

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle events
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle event a plugin can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookEvent {
    OnStartup,
    OnShutdown,
    OnConversationEnd,
    OnBrainUpdate,
    OnDbMaintenance,
    OnError,
    OnCommit,
    OnWorkflowStart,
    OnWorkflowEnd,

    /// Consumer-owned: regenerate project documentation
    OnDocumentationRefresh,
    /// Consumer-owned: review the assistant's own recent output
    OnSelfReview,
    /// Consumer-owned: scaffold a new extension
    OnExtensionScaffold,
}

impl HookEvent {
    pub const ALL: [HookEvent; 12] = [
        Self::OnStartup,
        Self::OnShutdown,
        Self::OnConversationEnd,
        Self::OnBrainUpdate,
        Self::OnDbMaintenance,
        Self::OnError,
        Self::OnCommit,
        Self::OnWorkflowStart,
        Self::OnWorkflowEnd,
        Self::OnDocumentationRefresh,
        Self::OnSelfReview,
        Self::OnExtensionScaffold,
    ];

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnStartup => "ON_STARTUP",
            Self::OnShutdown => "ON_SHUTDOWN",
            Self::OnConversationEnd => "ON_CONVERSATION_END",
            Self::OnBrainUpdate => "ON_BRAIN_UPDATE",
            Self::OnDbMaintenance => "ON_DB_MAINTENANCE",
            Self::OnError => "ON_ERROR",
            Self::OnCommit => "ON_COMMIT",
            Self::OnWorkflowStart => "ON_WORKFLOW_START",
            Self::OnWorkflowEnd => "ON_WORKFLOW_END",
            Self::OnDocumentationRefresh => "ON_DOCUMENTATION_REFRESH",
            Self::OnSelfReview => "ON_SELF_REVIEW",
            Self::OnExtensionScaffold => "ON_EXTENSION_SCAFFOLD",
        }
    }

    /// Parse from the event name, case-insensitive, with or without `ON_`
    pub fn from_str(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        let name = if upper.starts_with("ON_") {
            upper
        } else {
            format!("ON_{}", upper)
        };
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    /// Whether the core defines this event (as opposed to a consumer)
    pub fn is_lifecycle(&self) -> bool {
        !matches!(
            self,
            Self::OnDocumentationRefresh | Self::OnSelfReview | Self::OnExtensionScaffold
        )
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Plugin category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCategory {
    Maintenance,
    Monitoring,
    Memory,
    Documentation,
    Workflow,
    Integration,
    Custom,
}

impl PluginCategory {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Monitoring => "monitoring",
            Self::Memory => "memory",
            Self::Documentation => "documentation",
            Self::Workflow => "workflow",
            Self::Integration => "integration",
            Self::Custom => "custom",
        }
    }
}

/// Dispatch priority; lower ordinal runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginPriority {
    Critical,
    High,
    Medium,
    Low,
    Background,
}

impl PluginPriority {
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Background => 4,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Background => "background",
        }
    }
}

impl PartialOrd for PluginPriority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PluginPriority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for PluginPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plugin metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique plugin ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Version string (semver)
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub category: PluginCategory,
    pub priority: PluginPriority,
    /// Subscribed events
    pub hooks: Vec<HookEvent>,
    /// Execution budget override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl PluginMetadata {
    /// Metadata with category `custom` and priority `medium`
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: String::new(),
            category: PluginCategory::Custom,
            priority: PluginPriority::Medium,
            hooks: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: PluginCategory) -> Self {
        self.category = category;
        self
    }

    pub fn priority(mut self, priority: PluginPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Subscribe to an event
    pub fn hook(mut self, event: HookEvent) -> Self {
        if !self.hooks.contains(&event) {
            self.hooks.push(event);
        }
        self
    }

    /// Subscribe to several events
    pub fn hooks(self, events: impl IntoIterator<Item = HookEvent>) -> Self {
        events.into_iter().fold(self, |meta, event| meta.hook(event))
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Whether this plugin subscribes to `event`
    pub fn subscribes_to(&self, event: HookEvent) -> bool {
        self.hooks.contains(&event)
    }

    /// Check required fields
    pub fn validate(&self) -> PluginResult<()> {
        validate_id(&self.id).map_err(|e| PluginError::invalid_metadata(e.to_string()))?;
        if self.name.trim().is_empty() {
            return Err(PluginError::invalid_metadata(format!("plugin '{}' has no name", self.id)));
        }
        validate_version(&self.version)
            .map_err(|e| PluginError::invalid_metadata(format!("plugin '{}': {}", self.id, e)))?;
        if self.timeout_ms == Some(0) {
            return Err(PluginError::invalid_metadata(format!(
                "plugin '{}' has a zero timeout",
                self.id
            )));
        }
        Ok(())
    }

    /// Execution budget, falling back to `default`
    pub fn budget(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors and results
// ─────────────────────────────────────────────────────────────────────────────

/// Plugin error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginErrorKind {
    InvalidMetadata,
    AlreadyRegistered,
    InitializationFailed,
    NotFound,
    /// `execute` returned an error
    Failed,
    Timeout,
    Panicked,
    Cancelled,
    CleanupFailed,
    Manifest,
}

impl PluginErrorKind {
    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMetadata => "invalid_metadata",
            Self::AlreadyRegistered => "already_registered",
            Self::InitializationFailed => "initialization_failed",
            Self::NotFound => "not_found",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Panicked => "panicked",
            Self::Cancelled => "cancelled",
            Self::CleanupFailed => "cleanup_failed",
            Self::Manifest => "manifest",
        }
    }
}

impl fmt::Display for PluginErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plugin error
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{kind}] {message}")]
pub struct PluginError {
    pub kind: PluginErrorKind,
    pub message: String,
}

pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    pub fn new(kind: PluginErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// `execute` failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::Failed, message)
    }

    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::new(PluginErrorKind::InvalidMetadata, message)
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(PluginErrorKind::NotFound, format!("plugin not found: {}", id))
    }

    pub fn timeout(budget: Duration) -> Self {
        Self::new(
            PluginErrorKind::Timeout,
            format!("exceeded budget of {}ms", budget.as_millis()),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(PluginErrorKind::Cancelled, "dispatch cancelled")
    }
}

impl From<crate::CortexError> for PluginError {
    fn from(err: crate::CortexError) -> Self {
        Self::failed(err.to_string())
    }
}

/// Outcome of one plugin during a dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub plugin_id: String,
    pub priority: PluginPriority,
    pub outcome: Result<Value, PluginError>,
    pub duration_ms: u64,
}

impl DispatchRecord {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The error, if the plugin failed
    pub fn error(&self) -> Option<&PluginError> {
        self.outcome.as_ref().err()
    }

    /// The value, if the plugin succeeded
    pub fn value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }
}

/// Registered plugin as seen from outside the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub metadata: PluginMetadata,
    pub enabled: bool,
}

/// Result of `shutdown_all`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub cleaned: Vec<String>,
    pub failed: Vec<(String, PluginError)>,
}

impl ShutdownReport {
    /// True when every cleanup succeeded
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let mut priorities = vec![
            PluginPriority::Low,
            PluginPriority::Critical,
            PluginPriority::Background,
            PluginPriority::Medium,
            PluginPriority::High,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                PluginPriority::Critical,
                PluginPriority::High,
                PluginPriority::Medium,
                PluginPriority::Low,
                PluginPriority::Background,
            ]
        );
    }

    #[test]
    fn test_hook_event_names() {
        for event in HookEvent::ALL {
            assert_eq!(HookEvent::from_str(event.as_str()), Some(event));
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json, event.as_str());
        }
        assert_eq!(HookEvent::from_str("startup"), Some(HookEvent::OnStartup));
        assert_eq!(HookEvent::from_str("db-maintenance"), Some(HookEvent::OnDbMaintenance));
        assert_eq!(HookEvent::from_str("on_commit"), Some(HookEvent::OnCommit));
        assert!(HookEvent::from_str("ON_LUNCH").is_none());
        assert!(!HookEvent::OnSelfReview.is_lifecycle());
    }

    #[test]
    fn test_metadata_validation() {
        let meta = PluginMetadata::new("doc-refresh", "Doc refresh", "1.0.0").hook(HookEvent::OnCommit);
        assert!(meta.validate().is_ok());

        let bad_id = PluginMetadata::new("", "x", "1.0");
        assert_eq!(bad_id.validate().unwrap_err().kind, PluginErrorKind::InvalidMetadata);

        assert!(PluginMetadata::new("x", "", "1.0").validate().is_err());
        assert!(PluginMetadata::new("x", "X", "").validate().is_err());
        assert!(PluginMetadata::new("x", "X", "1.0").timeout_ms(0).validate().is_err());
    }

    #[test]
    fn test_hooks_deduplicate() {
        let meta = PluginMetadata::new("x", "X", "1.0").hooks([
            HookEvent::OnStartup,
            HookEvent::OnStartup,
            HookEvent::OnCommit,
        ]);
        assert_eq!(meta.hooks, vec![HookEvent::OnStartup, HookEvent::OnCommit]);
    }

    #[test]
    fn test_manifest_style_metadata_parses() {
        let meta: PluginMetadata = serde_json::from_value(serde_json::json!({
            "id": "cleanup",
            "name": "Cleanup",
            "version": "1.2.0",
            "category": "maintenance",
            "priority": "background",
            "hooks": ["ON_DB_MAINTENANCE"]
        }))
        .unwrap();
        assert_eq!(meta.priority, PluginPriority::Background);
        assert!(meta.subscribes_to(HookEvent::OnDbMaintenance));

        let bad: Result<PluginMetadata, _> = serde_json::from_value(serde_json::json!({
            "id": "cleanup",
            "name": "Cleanup",
            "version": "1.2.0",
            "category": "maintenance",
            "priority": "urgent",
            "hooks": []
        }));
        assert!(bad.is_err());
    }
}
