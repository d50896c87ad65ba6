//! Rule Book
//!
//! Read-only companion store loaded at startup. It lists the tier-0 rules the
//! assistant must never violate and the glob entries that mark knowledge
//! graph patterns as protected from decay and archival.
//!
//! ```toml
//! [[rules]]
//! id = "test-first"
//! description = "Write a failing test before the implementation"
//! severity = "blocking"
//!
//! [protection]
//! patterns = ["cortex.*"]
//! namespaces = ["cortex"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::glob_match;
use crate::CortexResult;

const BUILTIN_RULES: &str = r#"
[[rules]]
id = "brain-protection"
description = "Tier-0 rules and protected patterns cannot be modified at runtime"
severity = "blocking"

[[rules]]
id = "test-first"
description = "New behaviour starts with a failing test"
severity = "blocking"

[[rules]]
id = "definition-of-done"
description = "Work is done only when tests pass and no warnings remain"
severity = "warning"

[protection]
patterns = ["cortex.*", "tier0.*"]
namespaces = ["cortex"]
"#;

/// How strictly a tier-0 rule is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Blocking,
    #[default]
    Warning,
    Info,
}

/// A single tier-0 rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier0Rule {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub severity: RuleSeverity,
}

/// Glob entries that protect patterns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionRules {
    /// Matched against pattern ids
    pub patterns: Vec<String>,
    /// Matched against pattern namespaces
    pub namespaces: Vec<String>,
}

/// Tier-0 policy and protection seeds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleBook {
    pub rules: Vec<Tier0Rule>,
    pub protection: ProtectionRules,
}

impl RuleBook {
    /// The rules shipped with the SDK
    pub fn builtin() -> Self {
        // The embedded document is covered by tests.
        toml::from_str(BUILTIN_RULES).unwrap_or_default()
    }

    /// Parse a rule book from TOML text
    pub fn from_toml_str(content: &str) -> CortexResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a rule book file
    pub fn load(path: &Path) -> CortexResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let book = Self::from_toml_str(&content)?;
        info!(
            path = %path.display(),
            rules = book.rules.len(),
            "Loaded rule book"
        );
        Ok(book)
    }

    /// Load from `path` when given, otherwise use the built-in rules
    pub fn load_or_builtin(path: Option<&Path>) -> CortexResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Whether any tier-0 rule is in force
    pub fn has_tier0_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Look up a rule by id
    pub fn rule(&self, id: &str) -> Option<&Tier0Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Whether a pattern with this id and namespace is protected
    pub fn is_protected(&self, pattern_id: &str, namespace: &str) -> bool {
        self.protection.patterns.iter().any(|g| glob_match(g, pattern_id))
            || self.protection.namespaces.iter().any(|g| glob_match(g, namespace))
    }
}
