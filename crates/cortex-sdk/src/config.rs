//! SDK Configuration
//!
//! Defines configuration options for the Cortex SDK. Every section falls back
//! to its defaults, so a partial TOML file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::CortexResult;

/// SDK configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    /// Path to the SQLite database file (`None` keeps every tier in memory)
    pub database_path: Option<PathBuf>,

    /// Path to the rule book TOML (`None` uses the built-in rules)
    pub rules_path: Option<PathBuf>,

    /// Working memory (tier 1) configuration
    pub working_memory: WorkingMemoryConfig,

    /// Knowledge graph (tier 2) configuration
    pub knowledge_graph: KnowledgeGraphConfig,

    /// Context tier (tier 3) configuration
    pub context: ContextConfig,

    /// Plugin dispatch configuration
    pub dispatch: DispatchConfig,
}

/// Working memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingMemoryConfig {
    /// Maximum number of conversations held (default: 20)
    pub capacity: usize,

    /// Forward evicted conversations to the knowledge graph (default: true)
    pub promote_evicted: bool,

    /// Minimum message count before an evicted conversation is promoted (default: 2)
    pub min_messages_for_promotion: usize,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            promote_evicted: true,
            min_messages_for_promotion: 2,
        }
    }
}

/// How confidence is reduced on each decay period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayMode {
    /// confidence *= (1 - rate)
    #[default]
    Multiplicative,
    /// confidence -= rate
    Linear,
}

/// Knowledge graph configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeGraphConfig {
    /// Confidence lost per decay period (default: 0.05)
    pub decay_rate: f64,

    /// Length of one decay period in days (default: 30)
    pub decay_interval_days: u32,

    /// Patterns below this confidence are archived (default: 0.3)
    pub prune_threshold: f64,

    /// Decay arithmetic (default: multiplicative)
    pub decay_mode: DecayMode,

    /// Namespace searched after the caller's own (default: "generic")
    pub shared_namespace: String,

    /// Maximum search hits returned (default: 50)
    pub search_limit: usize,

    /// Confidence assigned to patterns promoted from evicted conversations (default: 0.5)
    pub promotion_confidence: f64,
}

impl Default for KnowledgeGraphConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.05,
            decay_interval_days: 30,
            prune_threshold: 0.3,
            decay_mode: DecayMode::Multiplicative,
            shared_namespace: "generic".to_string(),
            search_limit: 50,
            promotion_confidence: 0.5,
        }
    }
}

impl KnowledgeGraphConfig {
    /// One decay period as a chrono duration
    pub fn decay_interval(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.decay_interval_days))
    }
}

/// Longest accepted context window
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Context tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Lookback window for commit analysis in days (default: 30)
    pub window_days: u32,

    /// Churn ratio below which a file is stable (default: 0.10)
    pub stable_churn_threshold: f64,

    /// Churn ratio at or above which a file is volatile (default: 0.30)
    pub volatile_churn_threshold: f64,

    /// Pass rate at or above which tests are healthy (default: 0.95)
    pub healthy_pass_rate: f64,

    /// Pass rate at or above which tests are only a warning (default: 0.80)
    pub warning_pass_rate: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            stable_churn_threshold: 0.10,
            volatile_churn_threshold: 0.30,
            healthy_pass_rate: 0.95,
            warning_pass_rate: 0.80,
        }
    }
}

/// Plugin dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Execution budget per plugin invocation in milliseconds (default: 5000)
    pub plugin_timeout_ms: u64,

    /// Directories scanned for plugin manifests
    pub manifest_dirs: Vec<PathBuf>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            plugin_timeout_ms: 5000,
            manifest_dirs: Vec::new(),
        }
    }
}

impl CortexConfig {
    /// Create a config backed by the given database file
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(database_path.into()),
            ..Default::default()
        }
    }

    /// Create a config with every tier held in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set the rule book path
    pub fn with_rules(mut self, rules_path: impl Into<PathBuf>) -> Self {
        self.rules_path = Some(rules_path.into());
        self
    }

    /// Set working memory configuration
    pub fn with_working_memory(mut self, working_memory: WorkingMemoryConfig) -> Self {
        self.working_memory = working_memory;
        self
    }

    /// Set knowledge graph configuration
    pub fn with_knowledge_graph(mut self, knowledge_graph: KnowledgeGraphConfig) -> Self {
        self.knowledge_graph = knowledge_graph;
        self
    }

    /// Set context tier configuration
    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// Set dispatch configuration
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> CortexResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> CortexResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.working_memory.capacity == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "working_memory.capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        let kg = &self.knowledge_graph;
        if !(0.0..1.0).contains(&kg.decay_rate) {
            return Err(ConfigValidationError::InvalidValue {
                field: "knowledge_graph.decay_rate".into(),
                message: "must be in [0, 1)".into(),
            });
        }

        if kg.decay_interval_days == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "knowledge_graph.decay_interval_days".into(),
                message: "must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&kg.prune_threshold) {
            return Err(ConfigValidationError::InvalidValue {
                field: "knowledge_graph.prune_threshold".into(),
                message: "must be between 0 and 1".into(),
            });
        }

        if !(0.0..=1.0).contains(&kg.promotion_confidence) {
            return Err(ConfigValidationError::InvalidValue {
                field: "knowledge_graph.promotion_confidence".into(),
                message: "must be between 0 and 1".into(),
            });
        }

        if kg.shared_namespace.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "knowledge_graph.shared_namespace".into(),
                message: "must not be empty".into(),
            });
        }

        let ctx = &self.context;
        if ctx.window_days == 0 || ctx.window_days > MAX_WINDOW_DAYS {
            return Err(ConfigValidationError::InvalidValue {
                field: "context.window_days".into(),
                message: format!("must be between 1 and {}", MAX_WINDOW_DAYS),
            });
        }

        if ctx.stable_churn_threshold >= ctx.volatile_churn_threshold {
            return Err(ConfigValidationError::InvalidValue {
                field: "context.stable_churn_threshold".into(),
                message: "must be below context.volatile_churn_threshold".into(),
            });
        }

        if ctx.warning_pass_rate > ctx.healthy_pass_rate {
            return Err(ConfigValidationError::InvalidValue {
                field: "context.warning_pass_rate".into(),
                message: "must not exceed context.healthy_pass_rate".into(),
            });
        }

        if self.dispatch.plugin_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "dispatch.plugin_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CortexConfig::default();
        assert_eq!(config.working_memory.capacity, 20);
        assert_eq!(config.knowledge_graph.decay_interval_days, 30);
        assert_eq!(config.knowledge_graph.decay_mode, DecayMode::Multiplicative);
        assert_eq!(config.dispatch.plugin_timeout_ms, 5000);
        assert!(config.database_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CortexConfig::new("cortex.db").with_rules("/etc/cortex/rules.toml");

        assert_eq!(config.database_path, Some(PathBuf::from("cortex.db")));
        assert_eq!(config.rules_path, Some(PathBuf::from("/etc/cortex/rules.toml")));
    }

    #[test]
    fn test_config_validation() {
        let mut config = CortexConfig::default();
        config.working_memory.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = CortexConfig::default();
        config.knowledge_graph.decay_rate = 1.5;
        assert!(config.validate().is_err());

        let mut config = CortexConfig::default();
        config.context.stable_churn_threshold = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_days_is_bounded() {
        assert!(CortexConfig::from_toml_str("[context]\nwindow_days = 4000000000\n").is_err());

        let mut config = CortexConfig::default();
        config.context.window_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = CortexConfig::from_toml_str(
            r#"
            database_path = "brain.db"

            [knowledge_graph]
            decay_mode = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, Some(PathBuf::from("brain.db")));
        assert_eq!(config.knowledge_graph.decay_mode, DecayMode::Linear);
        assert_eq!(config.knowledge_graph.prune_threshold, 0.3);
        assert_eq!(config.working_memory.capacity, 20);
    }
}
