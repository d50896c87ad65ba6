//! Plugin contract
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use cortex_sdk::plugins::{
//!     DispatchContext, HookEvent, Plugin, PluginMetadata, PluginPriority, PluginResult,
//! };
//! use serde_json::{json, Value};
//!
//! struct CommitCounter;
//!
//! #[async_trait]
//! impl Plugin for CommitCounter {
//!     fn metadata(&self) -> PluginMetadata {
//!         PluginMetadata::new("commit-counter", "Commit counter", "1.0.0")
//!             .priority(PluginPriority::Low)
//!             .hook(HookEvent::OnCommit)
//!     }
//!
//!     async fn execute(&self, ctx: &DispatchContext) -> PluginResult<Value> {
//!         Ok(json!({ "sha": ctx.data_str("sha") }))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;

use super::context::DispatchContext;
use super::types::{PluginMetadata, PluginResult};

/// An extension module driven by lifecycle events
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Identity, priority and subscriptions. Read once at registration.
    fn metadata(&self) -> PluginMetadata;

    /// Called once before the plugin is added to any hook table.
    /// An error aborts registration.
    async fn initialize(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Handle one subscribed event
    async fn execute(&self, ctx: &DispatchContext) -> PluginResult<Value>;

    /// Release resources on unregister or shutdown
    async fn cleanup(&self) -> PluginResult<()> {
        Ok(())
    }
}
