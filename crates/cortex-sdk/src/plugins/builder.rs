//! Closure-backed plugins
//!
//! For small plugins that do not warrant their own type:
//!
//! ```rust
//! use cortex_sdk::plugins::{HookEvent, PluginBuilder, PluginPriority};
//! use serde_json::json;
//!
//! let plugin = PluginBuilder::new("ping", "Ping", "1.0.0")
//!     .priority(PluginPriority::Background)
//!     .hook(HookEvent::OnStartup)
//!     .build(|ctx| async move { Ok(json!({ "dispatch": ctx.dispatch_id() })) });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::context::DispatchContext;
use super::traits::Plugin;
use super::types::{HookEvent, PluginCategory, PluginMetadata, PluginPriority, PluginResult};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type LifecycleFn = Arc<dyn Fn() -> BoxFuture<PluginResult<()>> + Send + Sync>;
type ExecuteFn = Arc<dyn Fn(DispatchContext) -> BoxFuture<PluginResult<Value>> + Send + Sync>;

/// Builder for closure-backed plugins
pub struct PluginBuilder {
    metadata: PluginMetadata,
    initialize: Option<LifecycleFn>,
    cleanup: Option<LifecycleFn>,
}

impl PluginBuilder {
    /// Create a new plugin builder
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::from_metadata(PluginMetadata::new(id, name, version))
    }

    /// Start from complete metadata
    pub fn from_metadata(metadata: PluginMetadata) -> Self {
        Self {
            metadata,
            initialize: None,
            cleanup: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata = self.metadata.description(description);
        self
    }

    pub fn category(mut self, category: PluginCategory) -> Self {
        self.metadata = self.metadata.category(category);
        self
    }

    pub fn priority(mut self, priority: PluginPriority) -> Self {
        self.metadata = self.metadata.priority(priority);
        self
    }

    pub fn hook(mut self, event: HookEvent) -> Self {
        self.metadata = self.metadata.hook(event);
        self
    }

    pub fn hooks(mut self, events: impl IntoIterator<Item = HookEvent>) -> Self {
        self.metadata = self.metadata.hooks(events);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.metadata = self.metadata.timeout_ms(timeout_ms);
        self
    }

    /// Run `f` on initialize
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.initialize = Some(Arc::new(move || -> BoxFuture<PluginResult<()>> { Box::pin(f()) }));
        self
    }

    /// Run `f` on cleanup
    pub fn on_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<()>> + Send + 'static,
    {
        self.cleanup = Some(Arc::new(move || -> BoxFuture<PluginResult<()>> { Box::pin(f()) }));
        self
    }

    /// Build with an async execute handler
    pub fn build<F, Fut>(self, handler: F) -> ClosurePlugin
    where
        F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<Value>> + Send + 'static,
    {
        ClosurePlugin {
            metadata: self.metadata,
            initialize: self.initialize,
            cleanup: self.cleanup,
            execute: Arc::new(move |ctx| -> BoxFuture<PluginResult<Value>> { Box::pin(handler(ctx)) }),
        }
    }
}

/// Plugin implementation using closures
pub struct ClosurePlugin {
    metadata: PluginMetadata,
    initialize: Option<LifecycleFn>,
    cleanup: Option<LifecycleFn>,
    execute: ExecuteFn,
}

#[async_trait]
impl Plugin for ClosurePlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self) -> PluginResult<()> {
        match &self.initialize {
            Some(f) => f().await,
            None => Ok(()),
        }
    }

    async fn execute(&self, ctx: &DispatchContext) -> PluginResult<Value> {
        (self.execute)(ctx.clone()).await
    }

    async fn cleanup(&self) -> PluginResult<()> {
        match &self.cleanup {
            Some(f) => f().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::types::PluginError;
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_plugin_lifecycle() {
        let plugin = PluginBuilder::new("echo", "Echo", "1.0.0")
            .category(PluginCategory::Workflow)
            .priority(PluginPriority::High)
            .hook(HookEvent::OnWorkflowStart)
            .on_initialize(|| async { Ok(()) })
            .on_cleanup(|| async { Err(PluginError::failed("still busy")) })
            .build(|ctx| async move { Ok(json!({ "event": ctx.event().as_str() })) });

        let meta = plugin.metadata();
        assert_eq!(meta.id, "echo");
        assert_eq!(meta.priority, PluginPriority::High);
        assert_eq!(meta.hooks, vec![HookEvent::OnWorkflowStart]);

        assert!(plugin.initialize().await.is_ok());
        let out = plugin
            .execute(&DispatchContext::new(HookEvent::OnWorkflowStart))
            .await
            .unwrap();
        assert_eq!(out["event"], "ON_WORKFLOW_START");
        assert!(plugin.cleanup().await.is_err());
    }
}
