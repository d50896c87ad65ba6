//! Plugin Registry
//!
//! Owns registered plugins and the event -> subscriber tables, and runs
//! dispatches. Subscribers of one event run one after another in ascending
//! priority ordinal (registration order breaks ties). Every plugin call runs
//! on its own task under a time budget, so a failing, panicking or hung
//! plugin produces an error record and the dispatch moves on.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;

use super::context::DispatchContext;
use super::traits::Plugin;
use super::types::{
    DispatchRecord, HookEvent, PluginError, PluginErrorKind, PluginInfo, PluginMetadata,
    PluginResult, ShutdownReport,
};

/// Budget applied when neither the registry nor the plugin sets one
pub const DEFAULT_PLUGIN_TIMEOUT: Duration = Duration::from_millis(5000);

struct Entry {
    plugin: Arc<dyn Plugin>,
    metadata: PluginMetadata,
    enabled: AtomicBool,
    seq: u64,
}

impl Entry {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn info(&self) -> PluginInfo {
        PluginInfo {
            metadata: self.metadata.clone(),
            enabled: self.is_enabled(),
        }
    }

    fn sort_key(&self) -> (u8, u64) {
        (self.metadata.priority.ordinal(), self.seq)
    }
}

#[derive(Default)]
struct RegistryState {
    plugins: HashMap<String, Arc<Entry>>,
    hooks: HashMap<HookEvent, Vec<Arc<Entry>>>,
    // Ids whose initialize() is still running
    pending: HashSet<String>,
}

/// Registry and dispatcher for lifecycle plugins
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    next_seq: AtomicU64,
    default_timeout: Duration,
}

impl PluginRegistry {
    /// Create a registry with the default 5 second budget
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_PLUGIN_TIMEOUT)
    }

    /// Create a registry with a custom default budget
    pub fn with_timeout(default_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            next_seq: AtomicU64::new(0),
            default_timeout,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::with_timeout(Duration::from_millis(config.plugin_timeout_ms))
    }

    /// Budget for plugins without an override
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Validate, initialize and add a plugin.
    ///
    /// Nothing is added unless initialization succeeds. A duplicate id is
    /// rejected before the new plugin is initialized. The registry stays
    /// usable while `initialize` runs.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        self.insert(plugin, true).await
    }

    /// Register a plugin that stays skipped until `enable` is called
    pub async fn register_disabled(&self, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        self.insert(plugin, false).await
    }

    async fn insert(&self, plugin: Arc<dyn Plugin>, enabled: bool) -> PluginResult<()> {
        let metadata = plugin.metadata();
        if let Err(e) = metadata.validate() {
            warn!(plugin_id = %metadata.id, error = %e, "Rejected plugin with invalid metadata");
            return Err(e);
        }

        {
            let mut state = self.state.write().await;
            if state.plugins.contains_key(&metadata.id) || !state.pending.insert(metadata.id.clone()) {
                warn!(plugin_id = %metadata.id, "Rejected duplicate plugin registration");
                return Err(PluginError::new(
                    PluginErrorKind::AlreadyRegistered,
                    format!("plugin already registered: {}", metadata.id),
                ));
            }
        }

        let budget = metadata.budget(self.default_timeout);
        let init_plugin = Arc::clone(&plugin);
        let initialized = run_guarded(budget, None, async move { init_plugin.initialize().await }).await;

        let mut state = self.state.write().await;
        state.pending.remove(&metadata.id);
        if let Err(e) = initialized {
            warn!(plugin_id = %metadata.id, error = %e, "Plugin initialization failed");
            return Err(PluginError::new(
                PluginErrorKind::InitializationFailed,
                format!("{}: {}", metadata.id, e),
            ));
        }

        let entry = Arc::new(Entry {
            plugin,
            metadata: metadata.clone(),
            enabled: AtomicBool::new(enabled),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });

        for event in &metadata.hooks {
            let subscribers = state.hooks.entry(*event).or_default();
            subscribers.push(Arc::clone(&entry));
            subscribers.sort_by_key(|e| e.sort_key());
        }
        state.plugins.insert(metadata.id.clone(), entry);

        info!(
            plugin_id = %metadata.id,
            version = %metadata.version,
            priority = %metadata.priority,
            hooks = metadata.hooks.len(),
            enabled,
            "Registered plugin"
        );
        Ok(())
    }

    /// Remove a plugin and run its cleanup.
    ///
    /// The plugin is removed even when cleanup fails; the failure is returned.
    pub async fn unregister(&self, plugin_id: &str) -> PluginResult<()> {
        let entry = {
            let mut state = self.state.write().await;
            let entry = state
                .plugins
                .remove(plugin_id)
                .ok_or_else(|| PluginError::not_found(plugin_id))?;
            for subscribers in state.hooks.values_mut() {
                subscribers.retain(|e| e.metadata.id != plugin_id);
            }
            state.hooks.retain(|_, subscribers| !subscribers.is_empty());
            entry
        };

        info!(plugin_id, "Unregistered plugin");
        self.cleanup_entry(&entry).await
    }

    /// Resume dispatching to a plugin
    pub async fn enable(&self, plugin_id: &str) -> PluginResult<()> {
        self.set_enabled(plugin_id, true).await
    }

    /// Skip a plugin in dispatches without unregistering it
    pub async fn disable(&self, plugin_id: &str) -> PluginResult<()> {
        self.set_enabled(plugin_id, false).await
    }

    async fn set_enabled(&self, plugin_id: &str, enabled: bool) -> PluginResult<()> {
        let state = self.state.read().await;
        let entry = state
            .plugins
            .get(plugin_id)
            .ok_or_else(|| PluginError::not_found(plugin_id))?;
        entry.enabled.store(enabled, Ordering::Release);
        debug!(plugin_id, enabled, "Plugin toggled");
        Ok(())
    }

    /// Whether a plugin is registered and enabled
    pub async fn is_enabled(&self, plugin_id: &str) -> bool {
        let state = self.state.read().await;
        state.plugins.get(plugin_id).is_some_and(|e| e.is_enabled())
    }

    /// Get a plugin by id
    pub async fn get(&self, plugin_id: &str) -> Option<PluginInfo> {
        let state = self.state.read().await;
        state.plugins.get(plugin_id).map(|e| e.info())
    }

    /// All plugins, in priority order
    pub async fn list(&self) -> Vec<PluginInfo> {
        let state = self.state.read().await;
        let mut entries: Vec<&Arc<Entry>> = state.plugins.values().collect();
        entries.sort_by_key(|e| e.sort_key());
        entries.into_iter().map(|e| e.info()).collect()
    }

    /// Subscribers of `event` in dispatch order, enabled or not
    pub async fn plugins_for(&self, event: HookEvent) -> Vec<PluginInfo> {
        let state = self.state.read().await;
        state
            .hooks
            .get(&event)
            .map(|subscribers| subscribers.iter().map(|e| e.info()).collect())
            .unwrap_or_default()
    }

    /// Number of registered plugins
    pub async fn len(&self) -> usize {
        self.state.read().await.plugins.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run every enabled subscriber of the context's event, in priority order.
    ///
    /// Each subscriber gets the same context. Returns one record per plugin
    /// that was due to run; disabled plugins are skipped without a record.
    /// Once the context is cancelled, remaining plugins get `Cancelled`
    /// records without being invoked.
    pub async fn dispatch(&self, ctx: &DispatchContext) -> Vec<DispatchRecord> {
        let event = ctx.event();
        let subscribers = {
            let state = self.state.read().await;
            state.hooks.get(&event).cloned().unwrap_or_default()
        };

        info!(
            event = %event,
            dispatch_id = %ctx.dispatch_id(),
            subscribers = subscribers.len(),
            "Dispatching event"
        );

        let mut records = Vec::with_capacity(subscribers.len());
        for entry in subscribers {
            if !entry.is_enabled() {
                debug!(plugin_id = %entry.metadata.id, event = %event, "Skipping disabled plugin");
                continue;
            }

            if ctx.is_cancelled() {
                records.push(DispatchRecord {
                    plugin_id: entry.metadata.id.clone(),
                    priority: entry.metadata.priority,
                    outcome: Err(PluginError::cancelled()),
                    duration_ms: 0,
                });
                continue;
            }

            records.push(self.execute_entry(&entry, ctx).await);
        }

        let failed = records.iter().filter(|r| !r.is_ok()).count();
        info!(
            event = %event,
            dispatch_id = %ctx.dispatch_id(),
            executed = records.len(),
            failed,
            "Dispatch complete"
        );
        records
    }

    /// Clean up every plugin and empty the registry.
    ///
    /// Cleanup runs in priority order and continues past failures.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let mut entries: Vec<Arc<Entry>> = {
            let mut state = self.state.write().await;
            state.hooks.clear();
            state.plugins.drain().map(|(_, entry)| entry).collect()
        };
        entries.sort_by_key(|e| e.sort_key());

        let mut report = ShutdownReport::default();
        for entry in entries {
            match self.cleanup_entry(&entry).await {
                Ok(()) => report.cleaned.push(entry.metadata.id.clone()),
                Err(e) => report.failed.push((entry.metadata.id.clone(), e)),
            }
        }

        info!(
            cleaned = report.cleaned.len(),
            failed = report.failed.len(),
            "Plugin shutdown complete"
        );
        report
    }

    async fn execute_entry(&self, entry: &Entry, ctx: &DispatchContext) -> DispatchRecord {
        let budget = entry.metadata.budget(self.default_timeout);
        let plugin = Arc::clone(&entry.plugin);
        let task_ctx = ctx.clone();
        let started = Instant::now();

        let outcome = run_guarded(budget, Some(ctx.cancellation()), async move {
            plugin.execute(&task_ctx).await
        })
        .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &outcome {
            Ok(_) => debug!(plugin_id = %entry.metadata.id, duration_ms, "Plugin executed"),
            Err(e) => warn!(
                plugin_id = %entry.metadata.id,
                event = %ctx.event(),
                kind = %e.kind,
                error = %e.message,
                duration_ms,
                "Plugin execution failed"
            ),
        }

        DispatchRecord {
            plugin_id: entry.metadata.id.clone(),
            priority: entry.metadata.priority,
            outcome,
            duration_ms,
        }
    }

    async fn cleanup_entry(&self, entry: &Entry) -> PluginResult<()> {
        let budget = entry.metadata.budget(self.default_timeout);
        let plugin = Arc::clone(&entry.plugin);

        run_guarded(budget, None, async move { plugin.cleanup().await })
            .await
            .map_err(|e| {
                warn!(plugin_id = %entry.metadata.id, error = %e, "Plugin cleanup failed");
                PluginError::new(PluginErrorKind::CleanupFailed, format!("{}: {}", entry.metadata.id, e))
            })
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a plugin call on its own task under `budget`, stopping early if
/// `cancel` fires. Panics become `Panicked` errors.
async fn run_guarded<T, F>(budget: Duration, cancel: Option<&CancellationToken>, call: F) -> PluginResult<T>
where
    F: Future<Output = PluginResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(call);
    let abort = handle.abort_handle();
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;

        joined = tokio::time::timeout(budget, handle) => match joined {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => Err(PluginError::new(
                PluginErrorKind::Panicked,
                panic_message(e.into_panic()),
            )),
            Ok(Err(e)) => Err(PluginError::new(PluginErrorKind::Cancelled, e.to_string())),
            Err(_) => {
                abort.abort();
                Err(PluginError::timeout(budget))
            }
        },
        _ = cancelled => {
            abort.abort();
            Err(PluginError::cancelled())
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::builder::PluginBuilder;
    use crate::plugins::types::PluginPriority;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn simple(id: &str, priority: PluginPriority, event: HookEvent) -> Arc<dyn Plugin> {
        let plugin_id = id.to_string();
        Arc::new(
            PluginBuilder::new(id, id, "1.0.0")
                .priority(priority)
                .hook(event)
                .build(move |_ctx| {
                    let plugin_id = plugin_id.clone();
                    async move { Ok(json!({ "ran": plugin_id })) }
                }),
        )
    }

    fn ids(records: &[DispatchRecord]) -> Vec<&str> {
        records.iter().map(|r| r.plugin_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_priority_order() {
        let registry = PluginRegistry::new();
        registry.register(simple("low", PluginPriority::Low, HookEvent::OnStartup)).await.unwrap();
        registry.register(simple("critical", PluginPriority::Critical, HookEvent::OnStartup)).await.unwrap();
        registry.register(simple("medium", PluginPriority::Medium, HookEvent::OnStartup)).await.unwrap();
        registry.register(simple("other-event", PluginPriority::Critical, HookEvent::OnCommit)).await.unwrap();

        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnStartup)).await;
        assert_eq!(ids(&records), vec!["critical", "medium", "low"]);
        assert!(records.iter().all(|r| r.is_ok()));
        assert_eq!(records[0].value(), Some(&json!({ "ran": "critical" })));
    }

    #[tokio::test]
    async fn test_equal_priority_keeps_registration_order() {
        let registry = PluginRegistry::new();
        for id in ["first", "second", "third"] {
            registry.register(simple(id, PluginPriority::High, HookEvent::OnCommit)).await.unwrap();
        }
        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnCommit)).await;
        assert_eq!(ids(&records), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let registry = PluginRegistry::new();
        registry.register(simple("a", PluginPriority::Critical, HookEvent::OnCommit)).await.unwrap();
        registry
            .register(Arc::new(
                PluginBuilder::new("b", "B", "1.0.0")
                    .priority(PluginPriority::High)
                    .hook(HookEvent::OnCommit)
                    .build(|_ctx| async { Err(PluginError::failed("bad commit message")) }),
            ))
            .await
            .unwrap();
        registry
            .register(Arc::new(
                PluginBuilder::new("p", "P", "1.0.0")
                    .priority(PluginPriority::Medium)
                    .hook(HookEvent::OnCommit)
                    .build(|_ctx| async { panic!("index out of range") }),
            ))
            .await
            .unwrap();
        registry.register(simple("c", PluginPriority::Low, HookEvent::OnCommit)).await.unwrap();

        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnCommit)).await;
        assert_eq!(ids(&records), vec!["a", "b", "p", "c"]);
        assert!(records[0].is_ok());
        assert_eq!(records[1].error().map(|e| e.kind), Some(PluginErrorKind::Failed));
        let panicked = records[2].error().unwrap();
        assert_eq!(panicked.kind, PluginErrorKind::Panicked);
        assert!(panicked.message.contains("index out of range"));
        assert!(records[3].is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected_without_side_effects() {
        let registry = PluginRegistry::new();
        let initialized = Arc::new(AtomicUsize::new(0));

        let make = |counter: Arc<AtomicUsize>| -> Arc<dyn Plugin> {
            Arc::new(
                PluginBuilder::new("dup", "Dup", "1.0.0")
                    .hook(HookEvent::OnStartup)
                    .on_initialize(move || {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build(|_ctx| async { Ok(json!(null)) }),
            )
        };

        registry.register(make(Arc::clone(&initialized))).await.unwrap();
        let err = registry.register(make(Arc::clone(&initialized))).await.unwrap_err();

        assert_eq!(err.kind, PluginErrorKind::AlreadyRegistered);
        assert_eq!(registry.len().await, 1);
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(registry.plugins_for(HookEvent::OnStartup).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_initialize_is_all_or_nothing() {
        let registry = PluginRegistry::new();
        let err = registry
            .register(Arc::new(
                PluginBuilder::new("flaky", "Flaky", "1.0.0")
                    .hooks([HookEvent::OnStartup, HookEvent::OnShutdown])
                    .on_initialize(|| async { Err(PluginError::failed("missing credentials")) })
                    .build(|_ctx| async { Ok(json!(null)) }),
            ))
            .await
            .unwrap_err();

        assert_eq!(err.kind, PluginErrorKind::InitializationFailed);
        assert!(registry.is_empty().await);
        assert!(registry.plugins_for(HookEvent::OnStartup).await.is_empty());
        assert!(registry.plugins_for(HookEvent::OnShutdown).await.is_empty());

        let panicking = registry
            .register(Arc::new(
                PluginBuilder::new("boom", "Boom", "1.0.0")
                    .hook(HookEvent::OnStartup)
                    .on_initialize(|| async { panic!("init exploded") })
                    .build(|_ctx| async { Ok(json!(null)) }),
            ))
            .await;
        assert!(panicking.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_slow_initialize_does_not_block_the_registry() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register(simple("ready", PluginPriority::High, HookEvent::OnStartup)).await.unwrap();

        let started = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let (on_start, on_release) = (Arc::clone(&started), Arc::clone(&release));
        let slow: Arc<dyn Plugin> = Arc::new(
            PluginBuilder::new("warming", "Warming", "1.0.0")
                .hook(HookEvent::OnStartup)
                .on_initialize(move || {
                    let (on_start, on_release) = (Arc::clone(&on_start), Arc::clone(&on_release));
                    async move {
                        on_start.notify_one();
                        on_release.notified().await;
                        Ok(())
                    }
                })
                .build(|_ctx| async { Ok(json!(null)) }),
        );

        let pending = {
            let registry = Arc::clone(&registry);
            let slow = Arc::clone(&slow);
            tokio::spawn(async move { registry.register(slow).await })
        };
        started.notified().await;

        let records = tokio::time::timeout(
            Duration::from_secs(1),
            registry.dispatch(&DispatchContext::new(HookEvent::OnStartup)),
        )
        .await
        .unwrap();
        assert_eq!(ids(&records), vec!["ready"]);
        assert_eq!(registry.list().await.len(), 1);

        let duplicate = registry.register(slow).await.unwrap_err();
        assert_eq!(duplicate.kind, PluginErrorKind::AlreadyRegistered);

        release.notify_one();
        pending.await.unwrap().unwrap();
        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnStartup)).await;
        assert_eq!(ids(&records), vec!["ready", "warming"]);
    }

    #[tokio::test]
    async fn test_register_disabled_is_skipped_until_enabled() {
        let registry = PluginRegistry::new();
        registry
            .register_disabled(simple("dormant", PluginPriority::High, HookEvent::OnCommit))
            .await
            .unwrap();

        assert!(!registry.is_enabled("dormant").await);
        assert!(registry.dispatch(&DispatchContext::new(HookEvent::OnCommit)).await.is_empty());

        registry.enable("dormant").await.unwrap();
        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnCommit)).await;
        assert_eq!(ids(&records), vec!["dormant"]);
    }

    #[tokio::test]
    async fn test_invalid_metadata_is_rejected() {
        let registry = PluginRegistry::new();
        let err = registry
            .register(Arc::new(
                PluginBuilder::new("Bad Id", "Bad", "1.0.0").build(|_ctx| async { Ok(json!(null)) }),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind, PluginErrorKind::InvalidMetadata);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_slow_plugin_times_out_and_dispatch_continues() {
        let registry = PluginRegistry::with_timeout(Duration::from_millis(50));
        registry
            .register(Arc::new(
                PluginBuilder::new("slow", "Slow", "1.0.0")
                    .priority(PluginPriority::Critical)
                    .hook(HookEvent::OnBrainUpdate)
                    .build(|_ctx| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(json!(null))
                    }),
            ))
            .await
            .unwrap();
        registry
            .register(Arc::new(
                PluginBuilder::new("patient", "Patient", "1.0.0")
                    .priority(PluginPriority::High)
                    .hook(HookEvent::OnBrainUpdate)
                    .timeout_ms(500)
                    .build(|_ctx| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(json!("done"))
                    }),
            ))
            .await
            .unwrap();
        registry.register(simple("fast", PluginPriority::Low, HookEvent::OnBrainUpdate)).await.unwrap();

        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnBrainUpdate)).await;
        assert_eq!(ids(&records), vec!["slow", "patient", "fast"]);
        assert_eq!(records[0].error().map(|e| e.kind), Some(PluginErrorKind::Timeout));
        assert!(records[0].duration_ms < 5_000);
        assert_eq!(records[1].value(), Some(&json!("done")));
        assert!(records[2].is_ok());
    }

    #[tokio::test]
    async fn test_disabled_plugins_are_skipped() {
        let registry = PluginRegistry::new();
        registry.register(simple("a", PluginPriority::High, HookEvent::OnCommit)).await.unwrap();
        registry.register(simple("b", PluginPriority::Low, HookEvent::OnCommit)).await.unwrap();

        registry.disable("a").await.unwrap();
        assert!(!registry.is_enabled("a").await);
        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnCommit)).await;
        assert_eq!(ids(&records), vec!["b"]);
        assert_eq!(registry.len().await, 2);

        registry.enable("a").await.unwrap();
        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnCommit)).await;
        assert_eq!(ids(&records), vec!["a", "b"]);

        assert_eq!(
            registry.disable("missing").await.unwrap_err().kind,
            PluginErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_cancellation_stops_remaining_plugins() {
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(
                PluginBuilder::new("stopper", "Stopper", "1.0.0")
                    .priority(PluginPriority::Critical)
                    .hook(HookEvent::OnWorkflowEnd)
                    .build(|ctx| async move {
                        ctx.cancellation().cancel();
                        Ok(json!(null))
                    }),
            ))
            .await
            .unwrap();
        registry.register(simple("b", PluginPriority::Medium, HookEvent::OnWorkflowEnd)).await.unwrap();
        registry.register(simple("c", PluginPriority::Low, HookEvent::OnWorkflowEnd)).await.unwrap();

        let records = registry.dispatch(&DispatchContext::new(HookEvent::OnWorkflowEnd)).await;
        assert_eq!(records.len(), 3);
        for record in &records[1..] {
            assert_eq!(record.error().map(|e| e.kind), Some(PluginErrorKind::Cancelled));
        }
    }

    #[tokio::test]
    async fn test_cancelling_a_running_plugin() {
        let registry = PluginRegistry::new();
        registry
            .register(Arc::new(
                PluginBuilder::new("hang", "Hang", "1.0.0")
                    .hook(HookEvent::OnStartup)
                    .build(|_ctx| async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(json!(null))
                    }),
            ))
            .await
            .unwrap();

        let token = CancellationToken::new();
        let ctx = DispatchContext::builder(HookEvent::OnStartup)
            .cancellation(token.clone())
            .build();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let records = registry.dispatch(&ctx).await;
        canceller.await.unwrap();
        assert_eq!(records[0].error().map(|e| e.kind), Some(PluginErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_every_plugin_sees_the_same_context() {
        let registry = PluginRegistry::new();
        let seen: Arc<Mutex<Vec<DispatchContext>>> = Arc::new(Mutex::new(Vec::new()));

        for (id, priority) in [
            ("writer", PluginPriority::Critical),
            ("middle", PluginPriority::Medium),
            ("reader", PluginPriority::Low),
        ] {
            let seen = Arc::clone(&seen);
            let writer = id == "writer";
            registry
                .register(Arc::new(
                    PluginBuilder::new(id, id, "1.0.0")
                        .priority(priority)
                        .hook(HookEvent::OnStartup)
                        .build(move |ctx| {
                            let seen = Arc::clone(&seen);
                            async move {
                                if writer {
                                    ctx.set("token", json!(42)).await;
                                }
                                let token = ctx.get("token").await;
                                seen.lock().unwrap().push(ctx);
                                Ok(json!({ "token": token }))
                            }
                        }),
                ))
                .await
                .unwrap();
        }

        let ctx = DispatchContext::new(HookEvent::OnStartup);
        let records = registry.dispatch(&ctx).await;
        assert!(records.iter().all(|r| r.value() == Some(&json!({ "token": 42 }))));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|c| c.same_as(&ctx)));
    }

    #[tokio::test]
    async fn test_unregister_runs_cleanup() {
        let registry = PluginRegistry::new();
        let cleaned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned);

        registry
            .register(Arc::new(
                PluginBuilder::new("temp", "Temp", "1.0.0")
                    .hook(HookEvent::OnCommit)
                    .on_cleanup(move || {
                        let flag = Arc::clone(&flag);
                        async move {
                            flag.store(true, Ordering::SeqCst);
                            Ok(())
                        }
                    })
                    .build(|_ctx| async { Ok(json!(null)) }),
            ))
            .await
            .unwrap();

        registry.unregister("temp").await.unwrap();
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(registry.get("temp").await.is_none());
        assert!(registry.dispatch(&DispatchContext::new(HookEvent::OnCommit)).await.is_empty());
        assert!(registry.unregister("temp").await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_all_is_best_effort() {
        let registry = PluginRegistry::new();
        registry.register(simple("a", PluginPriority::High, HookEvent::OnShutdown)).await.unwrap();
        registry
            .register(Arc::new(
                PluginBuilder::new("stuck", "Stuck", "1.0.0")
                    .priority(PluginPriority::Critical)
                    .on_cleanup(|| async { Err(PluginError::failed("lock held")) })
                    .build(|_ctx| async { Ok(json!(null)) }),
            ))
            .await
            .unwrap();
        registry.register(simple("b", PluginPriority::Low, HookEvent::OnShutdown)).await.unwrap();

        let report = registry.shutdown_all().await;
        assert!(!report.success());
        assert_eq!(report.cleaned, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1.kind, PluginErrorKind::CleanupFailed);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_is_priority_ordered() {
        let registry = PluginRegistry::new();
        registry.register(simple("bg", PluginPriority::Background, HookEvent::OnError)).await.unwrap();
        registry.register(simple("crit", PluginPriority::Critical, HookEvent::OnError)).await.unwrap();

        let listed: Vec<String> = registry.list().await.into_iter().map(|p| p.metadata.id).collect();
        assert_eq!(listed, vec!["crit", "bg"]);
        assert!(registry.get("bg").await.unwrap().enabled);
    }
}
