//! Main SDK Entry Point
//!
//! `Cortex` ties the rule book, the three memory tiers, the health aggregator
//! and the plugin registry together. A host builds exactly one and passes it
//! around by reference.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::CortexConfig;
use crate::health::HealthAggregator;
use crate::memory::{ContextTier, KnowledgeGraph, WorkingMemory};
use crate::plugins::{
    DispatchContext, DispatchContextBuilder, DispatchRecord, HookEvent, LoadReport, Plugin,
    PluginCatalog, PluginErrorKind, PluginLoader, PluginRegistry, PluginResult, ShutdownReport,
};
use crate::rules::RuleBook;
use crate::tiers::Tiers;
use crate::CortexResult;

/// Cortex - Main entry point
///
/// # Example
///
/// ```rust,no_run
/// use cortex_sdk::{Cortex, CortexConfig, HookEvent};
/// use serde_json::json;
///
/// async fn example() -> anyhow::Result<()> {
///     let cortex = Cortex::open(CortexConfig::new("cortex.db"))?;
///     cortex.register_builtin_plugins().await?;
///
///     for record in cortex.dispatch(HookEvent::OnStartup, json!({})).await {
///         println!("{}: {}", record.plugin_id, record.is_ok());
///     }
///
///     cortex.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Cortex {
    config: CortexConfig,
    tiers: Tiers,
    health: Arc<HealthAggregator>,
    plugins: Arc<PluginRegistry>,
}

impl Cortex {
    /// Build every component from configuration.
    ///
    /// Tier storage opens lazily, so this only fails on invalid configuration.
    pub fn open(config: CortexConfig) -> CortexResult<Self> {
        config.validate()?;
        let tiers = Tiers::from_config(&config);
        Ok(Self::assemble(config, tiers))
    }

    /// Build with an explicit rule book instead of `rules_path`
    pub fn open_with_rules(config: CortexConfig, rules: RuleBook) -> CortexResult<Self> {
        config.validate()?;
        let tiers = Tiers::with_rules(&config, rules);
        Ok(Self::assemble(config, tiers))
    }

    /// Ephemeral instance with built-in rules
    pub fn in_memory() -> Self {
        let config = CortexConfig::in_memory();
        let tiers = Tiers::with_rules(&config, RuleBook::builtin());
        Self::assemble(config, tiers)
    }

    fn assemble(config: CortexConfig, tiers: Tiers) -> Self {
        let health = Arc::new(HealthAggregator::new(tiers.clone()));
        let plugins = Arc::new(PluginRegistry::from_config(&config.dispatch));

        info!(
            database = ?config.database_path,
            tier0_rules = tiers.rules.rules.len(),
            plugin_timeout_ms = config.dispatch.plugin_timeout_ms,
            "Cortex opened"
        );

        Self {
            config,
            tiers,
            health,
            plugins,
        }
    }

    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    /// Shared tier handles
    pub fn tiers(&self) -> &Tiers {
        &self.tiers
    }

    pub fn rules(&self) -> &RuleBook {
        &self.tiers.rules
    }

    pub fn working_memory(&self) -> &WorkingMemory {
        &self.tiers.working_memory
    }

    pub fn knowledge_graph(&self) -> &KnowledgeGraph {
        &self.tiers.knowledge_graph
    }

    pub fn context(&self) -> &ContextTier {
        &self.tiers.context
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// Register a plugin
    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        self.plugins.register(plugin).await
    }

    /// Register the maintenance, health-check and conversation-archive plugins
    #[cfg(feature = "builtin-plugins")]
    pub async fn register_builtin_plugins(&self) -> PluginResult<()> {
        use crate::plugins::builtin::{ConversationArchivePlugin, HealthCheckPlugin, MaintenancePlugin};

        self.register_plugin(Arc::new(MaintenancePlugin::new())).await?;
        self.register_plugin(Arc::new(HealthCheckPlugin::new())).await?;
        self.register_plugin(Arc::new(ConversationArchivePlugin::new())).await?;
        Ok(())
    }

    /// Load plugin manifests from the configured directories
    pub async fn load_plugins(&self, catalog: &PluginCatalog) -> LoadReport {
        PluginLoader::from_config(&self.config.dispatch)
            .load_all(catalog, &self.plugins)
            .await
    }

    /// Context builder with the tiers and health aggregator attached
    pub fn context_for(&self, event: HookEvent) -> DispatchContextBuilder {
        DispatchContext::builder(event)
            .tiers(self.tiers.clone())
            .health(Arc::clone(&self.health))
    }

    /// Fire `event` with `data` as the event payload
    pub async fn dispatch(&self, event: HookEvent, data: Value) -> Vec<DispatchRecord> {
        let ctx = self.context_for(event).payload(data).build();
        self.dispatch_with(&ctx).await
    }

    /// Fire a prepared context.
    ///
    /// Failed plugins (other than cancellations) are reported to ON_ERROR
    /// subscribers in a follow-up dispatch. Failures while handling ON_ERROR
    /// are only logged.
    pub async fn dispatch_with(&self, ctx: &DispatchContext) -> Vec<DispatchRecord> {
        let records = self.plugins.dispatch(ctx).await;
        if ctx.event() == HookEvent::OnError {
            return records;
        }

        let failures: Vec<Value> = records
            .iter()
            .filter_map(|r| r.error().map(|e| (r, e)))
            .filter(|(_, e)| e.kind != PluginErrorKind::Cancelled)
            .map(|(r, e)| {
                json!({
                    "plugin_id": r.plugin_id,
                    "kind": e.kind.as_str(),
                    "message": e.message,
                })
            })
            .collect();

        if !failures.is_empty() {
            let error_ctx = self
                .context_for(HookEvent::OnError)
                .data("source_event", json!(ctx.event().as_str()))
                .data("source_dispatch_id", json!(ctx.dispatch_id()))
                .data("failures", Value::Array(failures))
                .build();
            let handled = self.plugins.dispatch(&error_ctx).await;
            for record in handled.iter().filter(|r| !r.is_ok()) {
                warn!(plugin_id = %record.plugin_id, "ON_ERROR handler failed");
            }
        }

        records
    }

    /// Fire ON_SHUTDOWN, then clean up and remove every plugin
    pub async fn shutdown(&self) -> ShutdownReport {
        self.dispatch(HookEvent::OnShutdown, Value::Null).await;
        let report = self.plugins.shutdown_all().await;
        info!(success = report.success(), "Cortex shut down");
        report
    }
}
