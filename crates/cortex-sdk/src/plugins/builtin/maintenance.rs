use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::plugins::{
    DispatchContext, HookEvent, Plugin, PluginCategory, PluginError, PluginMetadata,
    PluginPriority, PluginResult,
};

/// Runs a knowledge graph decay pass.
///
/// The pass time defaults to now; an RFC 3339 `now` field in the event data
/// overrides it.
#[derive(Debug, Default)]
pub struct MaintenancePlugin;

impl MaintenancePlugin {
    pub const ID: &'static str = "maintenance";
    pub const KIND: &'static str = "maintenance";

    pub fn new() -> Self {
        Self
    }

    fn pass_time(ctx: &DispatchContext) -> PluginResult<DateTime<Utc>> {
        match ctx.data_str("now") {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| PluginError::failed(format!("invalid 'now' timestamp '{}': {}", raw, e))),
            None => Ok(Utc::now()),
        }
    }
}

#[async_trait]
impl Plugin for MaintenancePlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(Self::ID, "Knowledge maintenance", env!("CARGO_PKG_VERSION"))
            .description("Applies confidence decay and archives stale patterns")
            .category(PluginCategory::Maintenance)
            .priority(PluginPriority::High)
            .hooks([HookEvent::OnDbMaintenance, HookEvent::OnStartup])
    }

    async fn execute(&self, ctx: &DispatchContext) -> PluginResult<Value> {
        let tiers = ctx.require_tiers()?;
        let now = Self::pass_time(ctx)?;

        let report = tiers.knowledge_graph.decay_pass(now).await?;
        info!(
            decayed = report.decayed,
            archived = report.archived.len(),
            skipped_protected = report.skipped_protected,
            "Maintenance decay pass complete"
        );

        serde_json::to_value(&report).map_err(|e| PluginError::failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PatternUpsert;
    use crate::tiers::Tiers;
    use chrono::Duration;

    #[tokio::test]
    async fn test_decay_pass_through_dispatch_context() {
        let tiers = Tiers::in_memory();
        tiers
            .knowledge_graph
            .upsert_pattern(PatternUpsert::new("retry-on-lock", "Retry on lock", "backend").confidence(0.9))
            .await
            .unwrap();

        let later = Utc::now() + Duration::days(31);
        let ctx = DispatchContext::builder(HookEvent::OnDbMaintenance)
            .data("now", serde_json::json!(later.to_rfc3339()))
            .tiers(tiers.clone())
            .build();

        let result = MaintenancePlugin::new().execute(&ctx).await.unwrap();
        assert_eq!(result["decayed"], 1);

        let pattern = tiers.knowledge_graph.get_pattern("retry-on-lock").await.unwrap().unwrap();
        assert!(pattern.confidence < 0.9);
    }

    #[tokio::test]
    async fn test_requires_tiers_and_valid_time() {
        let plugin = MaintenancePlugin::new();
        assert!(plugin.execute(&DispatchContext::new(HookEvent::OnStartup)).await.is_err());

        let ctx = DispatchContext::builder(HookEvent::OnStartup)
            .data("now", serde_json::json!("yesterday"))
            .tiers(Tiers::in_memory())
            .build();
        assert!(plugin.execute(&ctx).await.is_err());
    }
}
