//! Health Aggregator
//!
//! Fuses the status of every tier into a 0-100 score and a flat metric
//! bundle. Reads here never fail: an unreachable tier contributes nothing to
//! the score and zeroed statistics to the bundle.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::memory::{ContextSnapshot, FileStability, KnowledgeGraphStats, TestHealth, WorkingMemoryStats};
use crate::storage::TierStatus;
use crate::tiers::Tiers;

use super::schema::{ConsumerContract, HealthSummaryTemplate, MetricBundle, ReportTemplate};

/// A scored component of overall health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthComponent {
    Tier0,
    WorkingMemory,
    KnowledgeGraph,
    Context,
}

impl HealthComponent {
    pub const ALL: [HealthComponent; 4] = [
        Self::Tier0,
        Self::WorkingMemory,
        Self::KnowledgeGraph,
        Self::Context,
    ];

    /// Points this component contributes when operational
    pub fn weight(&self) -> u8 {
        match self {
            Self::Tier0 => 20,
            Self::WorkingMemory => 30,
            Self::KnowledgeGraph => 30,
            Self::Context => 20,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier0 => "tier0",
            Self::WorkingMemory => "working_memory",
            Self::KnowledgeGraph => "knowledge_graph",
            Self::Context => "context",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Tier0 => "Tier-0 rule protection",
            Self::WorkingMemory => "Working memory",
            Self::KnowledgeGraph => "Knowledge graph",
            Self::Context => "Context tier",
        }
    }
}

/// Operability of each component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierFlags {
    pub tier0: bool,
    pub working_memory: bool,
    pub knowledge_graph: bool,
    pub context: bool,
}

impl TierFlags {
    /// Every component operational
    pub fn all() -> Self {
        Self {
            tier0: true,
            working_memory: true,
            knowledge_graph: true,
            context: true,
        }
    }

    pub fn get(&self, component: HealthComponent) -> bool {
        match component {
            HealthComponent::Tier0 => self.tier0,
            HealthComponent::WorkingMemory => self.working_memory,
            HealthComponent::KnowledgeGraph => self.knowledge_graph,
            HealthComponent::Context => self.context,
        }
    }
}

/// Weighted score in [0, 100]
pub fn compute_score(flags: TierFlags) -> u8 {
    HealthComponent::ALL
        .iter()
        .filter(|c| flags.get(**c))
        .map(|c| c.weight())
        .sum()
}

/// Coarse score band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthGrade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Self::Excellent,
            75..=89 => Self::Good,
            50..=74 => Self::Fair,
            _ => Self::Poor,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

impl std::fmt::Display for HealthGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One component's share of the score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: HealthComponent,
    pub status: TierStatus,
    pub weight: u8,
    pub contribution: u8,
}

/// Health snapshot across all tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: u8,
    pub grade: HealthGrade,
    pub components: Vec<ComponentHealth>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl HealthScore {
    /// Status of a single component
    pub fn status_of(&self, component: HealthComponent) -> Option<TierStatus> {
        self.components
            .iter()
            .find(|c| c.component == component)
            .map(|c| c.status)
    }
}

/// Everything the aggregator gathered in one pass
struct Observation {
    statuses: [(HealthComponent, TierStatus); 4],
    tier0_rules: usize,
    working: WorkingMemoryStats,
    knowledge: KnowledgeGraphStats,
    snapshot: Option<ContextSnapshot>,
    snapshots: usize,
}

/// Fuses tier state into scores and metric bundles
pub struct HealthAggregator {
    tiers: Tiers,
    consumers: RwLock<Vec<ConsumerContract>>,
}

impl HealthAggregator {
    /// Create an aggregator; the built-in health summary contract is registered
    pub fn new(tiers: Tiers) -> Self {
        Self {
            tiers,
            consumers: RwLock::new(vec![HealthSummaryTemplate.contract()]),
        }
    }

    /// Register a downstream consumer whose required fields every bundle must carry
    pub fn register_consumer(&self, contract: ConsumerContract) {
        if let Ok(mut consumers) = self.consumers.write() {
            consumers.retain(|c| c.name != contract.name);
            consumers.push(contract);
        }
    }

    /// Registered consumer contracts
    pub fn consumers(&self) -> Vec<ConsumerContract> {
        self.consumers.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Probe every tier and score the result
    pub async fn compute_health(&self) -> HealthScore {
        let observation = self.observe().await;
        self.score(&observation)
    }

    /// Assemble a version-stamped bundle covering every registered consumer
    pub async fn build_metric_bundle(&self) -> MetricBundle {
        let observation = self.observe().await;
        let health = self.score(&observation);

        let mut bundle = MetricBundle::new();
        bundle.insert("health.score", health.score);
        bundle.insert("health.grade", health.grade.as_str());
        for component in &health.components {
            bundle.insert(format!("{}.status", component.component.as_str()), component.status.as_str());
        }

        bundle.insert("tier0.rules", observation.tier0_rules);

        let working = &observation.working;
        bundle.insert("working_memory.conversations", working.conversations);
        bundle.insert("working_memory.messages", working.messages);
        bundle.insert("working_memory.capacity", working.capacity);
        bundle.insert("working_memory.utilization", working.utilization());

        let knowledge = &observation.knowledge;
        bundle.insert("knowledge_graph.total_patterns", knowledge.total_patterns);
        bundle.insert("knowledge_graph.active_patterns", knowledge.active_patterns);
        bundle.insert("knowledge_graph.archived_patterns", knowledge.archived_patterns);
        bundle.insert("knowledge_graph.protected_patterns", knowledge.protected_patterns);
        bundle.insert("knowledge_graph.relationships", knowledge.relationships);
        bundle.insert("knowledge_graph.average_confidence", knowledge.average_confidence);

        bundle.insert("context.snapshots", observation.snapshots);
        match &observation.snapshot {
            Some(snapshot) => {
                bundle.insert("context.commit_count", snapshot.commit_count);
                bundle.insert("context.commits_per_week", snapshot.commits_per_week);
                bundle.insert("context.volatile_files", snapshot.count(FileStability::Volatile));
                bundle.insert("context.test_pass_rate", snapshot.test_pass_rate);
                bundle.insert("context.test_health", snapshot.test_health.as_str());
            }
            None => {
                bundle.insert("context.test_health", TestHealth::Unknown.as_str());
            }
        }

        bundle.warnings = health.warnings;
        bundle.recommendations = health.recommendations;

        for contract in self.consumers() {
            bundle.backfill(&contract);
        }

        debug!(metrics = bundle.metrics.len(), "Built metric bundle");
        bundle
    }

    async fn observe(&self) -> Observation {
        let tier0 = if self.tiers.rules.has_tier0_rules() {
            TierStatus::Operational
        } else {
            TierStatus::Degraded
        };

        let working_status = self.tiers.working_memory.probe().await;
        let knowledge_status = self.tiers.knowledge_graph.probe().await;
        let context_status = self.tiers.context.probe().await;

        let snapshot = match self.tiers.context.latest_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Context snapshot unavailable");
                None
            }
        };

        Observation {
            statuses: [
                (HealthComponent::Tier0, tier0),
                (HealthComponent::WorkingMemory, working_status),
                (HealthComponent::KnowledgeGraph, knowledge_status),
                (HealthComponent::Context, context_status),
            ],
            tier0_rules: self.tiers.rules.rules.len(),
            working: self.tiers.working_memory.stats().await,
            knowledge: self.tiers.knowledge_graph.stats().await,
            snapshot,
            snapshots: self.tiers.context.snapshot_count().await,
        }
    }

    fn score(&self, observation: &Observation) -> HealthScore {
        let mut flags = TierFlags::default();
        let mut components = Vec::with_capacity(4);
        let mut warnings = Vec::new();
        let mut recommendations = Vec::new();

        for (component, status) in observation.statuses {
            let operational = status.is_operational();
            match component {
                HealthComponent::Tier0 => flags.tier0 = operational,
                HealthComponent::WorkingMemory => flags.working_memory = operational,
                HealthComponent::KnowledgeGraph => flags.knowledge_graph = operational,
                HealthComponent::Context => flags.context = operational,
            }
            if !operational {
                warnings.push(format!("{} is {}", component.label(), status));
            }
            components.push(ComponentHealth {
                component,
                status,
                weight: component.weight(),
                contribution: if operational { component.weight() } else { 0 },
            });
        }

        if !flags.tier0 {
            recommendations.push("Load a rule book with at least one tier-0 rule".to_string());
        }
        if observation.working.capacity > 0 && observation.working.utilization() >= 1.0 {
            recommendations.push(
                "Working memory is full; older conversations are being evicted".to_string(),
            );
        }
        let knowledge = &observation.knowledge;
        if knowledge.active_patterns > 0 && knowledge.average_confidence < 0.5 {
            recommendations.push(format!(
                "Average pattern confidence is {:.2}; reinforce patterns that are still relevant",
                knowledge.average_confidence
            ));
        }
        match &observation.snapshot {
            None => recommendations.push("Capture project context to track churn and test health".to_string()),
            Some(snapshot) => {
                let volatile = snapshot.count(FileStability::Volatile);
                if volatile > 0 {
                    warnings.push(format!("{} volatile file(s) in the last {} days", volatile, snapshot.window_days));
                }
                if snapshot.test_health == TestHealth::Failing {
                    warnings.push("Test suite is failing".to_string());
                }
            }
        }

        let score = compute_score(flags);
        HealthScore {
            score,
            grade: HealthGrade::from_score(score),
            components,
            warnings,
            recommendations,
            computed_at: Utc::now(),
        }
    }
}
