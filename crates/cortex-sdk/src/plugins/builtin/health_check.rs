use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::health::{HealthAggregator, HealthGrade};
use crate::plugins::{
    DispatchContext, HookEvent, Plugin, PluginCategory, PluginError, PluginMetadata,
    PluginPriority, PluginResult,
};

/// Publishes a health snapshot.
///
/// Uses the aggregator attached to the context, or builds one over the
/// attached tiers. The score is also stored as `health.score` in the
/// dispatch scratch space for plugins that run later.
#[derive(Debug, Default)]
pub struct HealthCheckPlugin;

impl HealthCheckPlugin {
    pub const ID: &'static str = "health-check";
    pub const KIND: &'static str = "health-check";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for HealthCheckPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(Self::ID, "Health check", env!("CARGO_PKG_VERSION"))
            .description("Scores tier health and reports warnings")
            .category(PluginCategory::Monitoring)
            .priority(PluginPriority::Medium)
            .hooks([HookEvent::OnStartup, HookEvent::OnBrainUpdate])
    }

    async fn execute(&self, ctx: &DispatchContext) -> PluginResult<Value> {
        let aggregator = match ctx.health() {
            Some(health) => Arc::clone(health),
            None => Arc::new(HealthAggregator::new(ctx.require_tiers()?.clone())),
        };

        let health = aggregator.compute_health().await;
        ctx.set("health.score", json!(health.score)).await;

        if matches!(health.grade, HealthGrade::Poor) {
            warn!(score = health.score, warnings = health.warnings.len(), "Cortex health is poor");
        } else {
            info!(score = health.score, grade = %health.grade.as_str(), "Health check complete");
        }

        serde_json::to_value(&health).map_err(|e| PluginError::failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::Tiers;

    #[tokio::test]
    async fn test_reports_full_score_for_healthy_tiers() {
        let ctx = DispatchContext::builder(HookEvent::OnStartup)
            .tiers(Tiers::in_memory())
            .build();

        let result = HealthCheckPlugin::new().execute(&ctx).await.unwrap();
        assert_eq!(result["score"], 100);
        assert_eq!(ctx.get("health.score").await, Some(json!(100)));
    }

    #[tokio::test]
    async fn test_without_tiers_fails() {
        let ctx = DispatchContext::new(HookEvent::OnBrainUpdate);
        assert!(HealthCheckPlugin::new().execute(&ctx).await.is_err());
    }
}
