//! Plugin system
//!
//! Plugins subscribe to lifecycle events (`HookEvent`) and are dispatched in
//! priority order by the `PluginRegistry`. Each dispatch shares one
//! `DispatchContext` across its plugins; a plugin that fails, panics or
//! overruns its budget produces an error record without affecting the rest.

mod builder;
mod context;
mod loader;
mod registry;
mod traits;
mod types;

#[cfg(feature = "builtin-plugins")]
pub mod builtin;

pub use builder::{ClosurePlugin, PluginBuilder};
pub use context::{DispatchContext, DispatchContextBuilder};
pub use loader::{LoadReport, PluginCatalog, PluginFactory, PluginLoader, PluginManifest};
pub use registry::{PluginRegistry, DEFAULT_PLUGIN_TIMEOUT};
pub use traits::Plugin;
pub use types::{
    DispatchRecord, HookEvent, PluginCategory, PluginError, PluginErrorKind, PluginInfo,
    PluginMetadata, PluginPriority, PluginResult, ShutdownReport,
};
