//! Metric bundle schema and consumer contracts
//!
//! A `MetricBundle` is a flat, version-stamped map of dotted metric keys.
//! Report templates declare which keys and which schema version they need;
//! `render_report` checks the bundle against that contract first and picks
//! the template's legacy path on any mismatch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Schema version stamped on every bundle this crate produces
pub const METRICS_SCHEMA_VERSION: &str = "2.0";

/// Version-stamped metrics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricBundle {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl MetricBundle {
    /// Empty bundle stamped with the current schema version
    pub fn new() -> Self {
        Self {
            schema_version: METRICS_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            metrics: BTreeMap::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Set a metric
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metrics.insert(key.into(), value.into());
    }

    /// Get a metric
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metrics.get(key)
    }

    /// Metric as a display string, `n/a` when absent or null
    pub fn display(&self, key: &str) -> String {
        match self.metrics.get(key) {
            None | Some(Value::Null) => "n/a".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Required fields of `contract` absent from this bundle
    pub fn missing_fields(&self, contract: &ConsumerContract) -> Vec<String> {
        contract
            .required_fields
            .iter()
            .filter(|f| !self.metrics.contains_key(f.as_str()))
            .cloned()
            .collect()
    }

    /// Insert `null` for every required field of `contract` not produced
    pub fn backfill(&mut self, contract: &ConsumerContract) {
        for field in self.missing_fields(contract) {
            warn!(
                consumer = %contract.name,
                field = %field,
                "Metric required by consumer is not produced; back-filling null"
            );
            self.warnings.push(format!(
                "Metric '{}' required by '{}' is not available",
                field, contract.name
            ));
            self.metrics.insert(field, Value::Null);
        }
    }
}

impl Default for MetricBundle {
    fn default() -> Self {
        Self::new()
    }
}

/// What a report consumer expects from a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerContract {
    pub name: String,
    pub schema_version: String,
    pub required_fields: Vec<String>,
}

impl ConsumerContract {
    pub fn new<I, S>(name: impl Into<String>, schema_version: impl Into<String>, required_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            schema_version: schema_version.into(),
            required_fields: required_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Decide how a bundle should be rendered for this consumer
    pub fn check(&self, bundle: &MetricBundle) -> RenderDecision {
        if bundle.schema_version != self.schema_version {
            return RenderDecision::Fallback(format!(
                "schema version {} does not match expected {}",
                bundle.schema_version, self.schema_version
            ));
        }

        let missing = bundle.missing_fields(self);
        if !missing.is_empty() {
            return RenderDecision::Fallback(format!("missing fields: {}", missing.join(", ")));
        }

        RenderDecision::Full
    }
}

/// Which rendering path a consumer takes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderDecision {
    Full,
    Fallback(String),
}

impl RenderDecision {
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// A consumer that renders metric bundles
pub trait ReportTemplate: Send + Sync {
    /// Fields and version this template needs
    fn contract(&self) -> ConsumerContract;

    /// Render a bundle that satisfies the contract
    fn render_full(&self, bundle: &MetricBundle) -> String;

    /// Degraded rendering for bundles that do not
    fn render_legacy(&self, bundle: &MetricBundle, reason: &str) -> String;
}

/// A rendered report and the path that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedReport {
    pub decision: RenderDecision,
    pub body: String,
}

/// Validate `bundle` against the template's contract, then render
pub fn render_report(template: &dyn ReportTemplate, bundle: &MetricBundle) -> RenderedReport {
    let contract = template.contract();
    let decision = contract.check(bundle);
    let body = match &decision {
        RenderDecision::Full => template.render_full(bundle),
        RenderDecision::Fallback(reason) => {
            warn!(consumer = %contract.name, reason = %reason, "Rendering report on fallback path");
            template.render_legacy(bundle, reason)
        }
    };
    RenderedReport { decision, body }
}

/// Plain-text health summary
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthSummaryTemplate;

impl HealthSummaryTemplate {
    pub const NAME: &'static str = "health_summary";

    const FIELDS: [&'static str; 7] = [
        "health.score",
        "health.grade",
        "tier0.rules",
        "working_memory.conversations",
        "working_memory.capacity",
        "knowledge_graph.active_patterns",
        "context.test_health",
    ];
}

impl ReportTemplate for HealthSummaryTemplate {
    fn contract(&self) -> ConsumerContract {
        ConsumerContract::new(Self::NAME, METRICS_SCHEMA_VERSION, Self::FIELDS)
    }

    fn render_full(&self, bundle: &MetricBundle) -> String {
        let mut out = format!(
            "Health: {}/100 ({})\n",
            bundle.display("health.score"),
            bundle.display("health.grade")
        );
        out.push_str(&format!("  Tier-0 rules:     {}\n", bundle.display("tier0.rules")));
        out.push_str(&format!(
            "  Working memory:   {}/{} conversations\n",
            bundle.display("working_memory.conversations"),
            bundle.display("working_memory.capacity")
        ));
        out.push_str(&format!(
            "  Knowledge graph:  {} active patterns\n",
            bundle.display("knowledge_graph.active_patterns")
        ));
        out.push_str(&format!("  Tests:            {}\n", bundle.display("context.test_health")));

        for warning in &bundle.warnings {
            out.push_str(&format!("  ! {}\n", warning));
        }
        for recommendation in &bundle.recommendations {
            out.push_str(&format!("  > {}\n", recommendation));
        }
        out
    }

    fn render_legacy(&self, bundle: &MetricBundle, reason: &str) -> String {
        format!(
            "Health: {} (limited report: {})\n",
            bundle.display("health.score"),
            reason
        )
    }
}
