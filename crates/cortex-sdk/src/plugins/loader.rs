//! Plugin Loader
//!
//! Discovers plugin manifests on disk and turns them into registered plugins.
//! A manifest names a `kind`; the `PluginCatalog` maps kinds to factories,
//! and the manifest's metadata (id, priority, hooks, budget) overrides
//! whatever the built plugin reports.
//!
//! ```toml
//! id = "nightly-decay"
//! name = "Nightly decay"
//! version = "1.0.0"
//! kind = "maintenance"
//! priority = "background"
//! hooks = ["ON_DB_MAINTENANCE"]
//! enabled = true
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;

use super::context::DispatchContext;
use super::registry::PluginRegistry;
use super::traits::Plugin;
use super::types::{
    HookEvent, PluginCategory, PluginError, PluginErrorKind, PluginMetadata, PluginPriority,
    PluginResult,
};

fn default_category() -> PluginCategory {
    PluginCategory::Custom
}

fn default_priority() -> PluginPriority {
    PluginPriority::Medium
}

fn default_enabled() -> bool {
    true
}

/// On-disk plugin description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Catalog key of the factory that builds the plugin
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: PluginCategory,
    #[serde(default = "default_priority")]
    pub priority: PluginPriority,
    #[serde(default)]
    pub hooks: Vec<HookEvent>,
    /// Registered but skipped by dispatch when false
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Free-form settings handed to the factory
    #[serde(default)]
    pub config: Value,
}

impl PluginManifest {
    /// Parse a manifest, choosing the format by file extension
    pub fn parse(content: &str, path: &Path) -> PluginResult<Self> {
        let manifest: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(content)
                .map_err(|e| manifest_error(format!("{}: invalid TOML: {}", path.display(), e)))?,
            _ => serde_json::from_str(content)
                .map_err(|e| manifest_error(format!("{}: invalid JSON: {}", path.display(), e)))?,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Metadata the registered plugin will carry
    pub fn metadata(&self) -> PluginMetadata {
        let mut metadata = PluginMetadata::new(&self.id, &self.name, &self.version)
            .description(&self.description)
            .category(self.category)
            .priority(self.priority)
            .hooks(self.hooks.iter().copied());
        metadata.timeout_ms = self.timeout_ms;
        metadata
    }

    pub fn validate(&self) -> PluginResult<()> {
        if self.kind.trim().is_empty() {
            return Err(manifest_error(format!("{}: missing plugin kind", self.id)));
        }
        self.metadata().validate()
    }
}

fn manifest_error(message: impl Into<String>) -> PluginError {
    PluginError::new(PluginErrorKind::Manifest, message)
}

/// Builds a plugin instance from its manifest
pub type PluginFactory = Arc<dyn Fn(&PluginManifest) -> PluginResult<Arc<dyn Plugin>> + Send + Sync>;

/// Kind -> factory table
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: HashMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the built-in plugin kinds
    #[cfg(feature = "builtin-plugins")]
    pub fn with_builtins() -> Self {
        use super::builtin::{ConversationArchivePlugin, HealthCheckPlugin, MaintenancePlugin};

        let mut catalog = Self::new();
        catalog.register(MaintenancePlugin::KIND, |_| Ok(Arc::new(MaintenancePlugin::new())));
        catalog.register(HealthCheckPlugin::KIND, |_| Ok(Arc::new(HealthCheckPlugin::new())));
        catalog.register(ConversationArchivePlugin::KIND, |_| {
            Ok(Arc::new(ConversationArchivePlugin::new()))
        });
        catalog
    }

    /// Add or replace the factory for `kind`
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&PluginManifest) -> PluginResult<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Known kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Build the plugin a manifest describes
    pub fn build(&self, manifest: &PluginManifest) -> PluginResult<Arc<dyn Plugin>> {
        let factory = self.factories.get(&manifest.kind).ok_or_else(|| {
            manifest_error(format!("{}: unknown plugin kind '{}'", manifest.id, manifest.kind))
        })?;
        let plugin = factory(manifest)?;
        Ok(Arc::new(ManifestPlugin {
            metadata: manifest.metadata(),
            inner: plugin,
        }))
    }
}

/// Plugin whose metadata comes from a manifest
struct ManifestPlugin {
    metadata: PluginMetadata,
    inner: Arc<dyn Plugin>,
}

#[async_trait]
impl Plugin for ManifestPlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    async fn initialize(&self) -> PluginResult<()> {
        self.inner.initialize().await
    }

    async fn execute(&self, ctx: &DispatchContext) -> PluginResult<Value> {
        self.inner.execute(ctx).await
    }

    async fn cleanup(&self) -> PluginResult<()> {
        self.inner.cleanup().await
    }
}

/// Outcome of `PluginLoader::load_all`
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Registered plugin ids, in load order
    pub loaded: Vec<String>,
    /// Registered but disabled by their manifest
    pub disabled: Vec<String>,
    /// Manifests that could not be loaded
    pub failed: Vec<(PathBuf, PluginError)>,
}

/// Scans manifest directories
#[derive(Debug, Clone, Default)]
pub struct PluginLoader {
    directories: Vec<PathBuf>,
}

impl PluginLoader {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self { directories }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.manifest_dirs.clone())
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Read and validate one manifest file
    pub async fn load_manifest(path: &Path) -> PluginResult<PluginManifest> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| manifest_error(format!("failed to read {}: {}", path.display(), e)))?;
        PluginManifest::parse(&content, path)
    }

    /// Manifest files (`*.json`, `*.toml`) in every directory, sorted by path.
    /// Missing directories are skipped.
    pub async fn manifest_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        for dir in &self.directories {
            let Ok(mut entries) = fs::read_dir(dir).await else {
                debug!(dir = %dir.display(), "Manifest directory not readable, skipping");
                continue;
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let is_manifest = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("json") | Some("toml")
                );
                if is_manifest && path.is_file() {
                    paths.push(path);
                }
            }
        }

        paths.sort();
        paths
    }

    /// Scan every directory and parse what is found
    pub async fn scan(&self) -> Vec<(PathBuf, PluginResult<PluginManifest>)> {
        let mut results = Vec::new();
        for path in self.manifest_paths().await {
            let manifest = Self::load_manifest(&path).await;
            results.push((path, manifest));
        }
        results
    }

    /// Build and register every manifest the catalog knows how to build.
    ///
    /// One bad manifest does not stop the others.
    pub async fn load_all(&self, catalog: &PluginCatalog, registry: &PluginRegistry) -> LoadReport {
        let mut report = LoadReport::default();

        for (path, manifest) in self.scan().await {
            let outcome = match manifest {
                Ok(manifest) => Self::install(&manifest, catalog, registry).await.map(|_| manifest),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(manifest) => {
                    if !manifest.enabled {
                        report.disabled.push(manifest.id.clone());
                    }
                    report.loaded.push(manifest.id);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load plugin manifest");
                    report.failed.push((path, e));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            disabled = report.disabled.len(),
            failed = report.failed.len(),
            "Plugin manifests loaded"
        );
        report
    }

    async fn install(
        manifest: &PluginManifest,
        catalog: &PluginCatalog,
        registry: &PluginRegistry,
    ) -> PluginResult<()> {
        let plugin = catalog.build(manifest)?;
        if manifest.enabled {
            registry.register(plugin).await
        } else {
            registry.register_disabled(plugin).await
        }
    }
}
