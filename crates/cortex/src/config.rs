//! Configuration management for cortex.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (CORTEX_CONFIG, CORTEX_DATABASE_PATH)
//! 2. Config file (<data dir>/config.toml)
//! 3. Default values

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cortex_sdk::CortexConfig;
use directories::ProjectDirs;

/// Resolved CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SDK configuration with every path filled in
    pub cortex: CortexConfig,

    /// Where the configuration was read from (may not exist)
    pub source: PathBuf,
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "cortex", "cortex") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cortex")
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let source = Self::config_path();

        let file_config = if source.exists() {
            CortexConfig::load(&source)
                .with_context(|| format!("Failed to load config file {}", source.display()))?
        } else {
            CortexConfig::default()
        };

        let database_override = std::env::var("CORTEX_DATABASE_PATH").ok().map(PathBuf::from);
        Ok(Self {
            cortex: Self::resolve(file_config, &default_data_dir(), database_override),
            source,
        })
    }

    /// Fill in paths the file left unset.
    ///
    /// The database defaults to `<data dir>/cortex.db` and plugin manifests
    /// to `<data dir>/plugins`; `database_override` wins over both.
    pub fn resolve(mut cortex: CortexConfig, data_dir: &Path, database_override: Option<PathBuf>) -> CortexConfig {
        if let Some(path) = database_override {
            cortex.database_path = Some(path);
        } else if cortex.database_path.is_none() {
            cortex.database_path = Some(data_dir.join("cortex.db"));
        }

        if cortex.dispatch.manifest_dirs.is_empty() {
            cortex.dispatch.manifest_dirs.push(data_dir.join("plugins"));
        }

        cortex
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CORTEX_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.cortex.database_path.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let resolved = Config::resolve(CortexConfig::default(), Path::new("/data/cortex"), None);
        assert_eq!(resolved.database_path, Some(PathBuf::from("/data/cortex/cortex.db")));
        assert_eq!(resolved.dispatch.manifest_dirs, vec![PathBuf::from("/data/cortex/plugins")]);
    }

    #[test]
    fn test_file_and_env_precedence() {
        let file = CortexConfig::from_toml_str(
            r#"
            database_path = "/srv/cortex/file.db"

            [dispatch]
            manifest_dirs = ["/srv/cortex/manifests"]
            "#,
        )
        .unwrap();

        let resolved = Config::resolve(file.clone(), Path::new("/data"), None);
        assert_eq!(resolved.database_path, Some(PathBuf::from("/srv/cortex/file.db")));
        assert_eq!(resolved.dispatch.manifest_dirs, vec![PathBuf::from("/srv/cortex/manifests")]);

        let resolved = Config::resolve(file, Path::new("/data"), Some(PathBuf::from("/tmp/env.db")));
        assert_eq!(resolved.database_path, Some(PathBuf::from("/tmp/env.db")));
    }

    #[test]
    fn test_ensure_dirs_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            cortex: CortexConfig::new(dir.path().join("nested").join("cortex.db")),
            source: dir.path().join("config.toml"),
        };
        config.ensure_dirs().unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
