//! Configuration loading for the entity index.
//!
//! Layered config: defaults -> config file -> explicit file -> env vars.
//! The default config file lives at ~/.config/entity-index/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TypesError;

/// Smallest writer arena Tantivy accepts, in MB.
pub const MIN_WRITER_MEMORY_MB: usize = 15;

/// When readers pick up new commits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReloadMode {
    /// Readers reload shortly after every commit (default)
    #[default]
    OnCommit,
    /// Readers only move forward on an explicit refresh
    Manual,
}

/// Index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Base directory for on-disk indexes; one subdirectory per kind and version
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Keep indexes in RAM only (tests)
    #[serde(default)]
    pub in_memory: bool,

    /// Memory budget for the index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Most write operations folded into a single commit
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Reader reload behaviour
    #[serde(default)]
    pub reload_policy: ReloadMode,
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "entity-index")
        .map(|p| p.data_local_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("./index"))
        .to_string_lossy()
        .to_string()
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_max_batch_size() -> usize {
    64
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            in_memory: false,
            writer_memory_mb: default_writer_memory_mb(),
            max_batch_size: default_max_batch_size(),
            reload_policy: ReloadMode::default(),
        }
    }
}

impl IndexSettings {
    /// Settings for an ephemeral in-memory index.
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Default::default()
        }
    }

    /// Settings for an on-disk index rooted at `path`.
    pub fn on_disk(path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: path.into().to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    pub fn with_reload_policy(mut self, policy: ReloadMode) -> Self {
        self.reload_policy = policy;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/entity-index/config.toml)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (ENTITY_INDEX_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, TypesError> {
        let config_dir = ProjectDirs::from("", "", "entity-index")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("index_path", default_index_path())
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("in_memory", false)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("max_batch_size", default_max_batch_size() as i64)
            .map_err(|e| TypesError::Config(e.to_string()))?
            .set_default("reload_policy", "on_commit")
            .map_err(|e| TypesError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: ENTITY_INDEX_INDEX_PATH, ENTITY_INDEX_IN_MEMORY, ...
        builder = builder.add_source(
            Environment::with_prefix("ENTITY_INDEX")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| TypesError::Config(e.to_string()))?;

        let settings: Self = config
            .try_deserialize()
            .map_err(|e| TypesError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.max_batch_size == 0 {
            return Err(TypesError::Config("max_batch_size must be > 0".to_string()));
        }
        if self.writer_memory_mb < MIN_WRITER_MEMORY_MB {
            return Err(TypesError::Config(format!(
                "writer_memory_mb must be >= {}, got {}",
                MIN_WRITER_MEMORY_MB, self.writer_memory_mb
            )));
        }
        if !self.in_memory && self.index_path.is_empty() {
            return Err(TypesError::Config(
                "index_path is required for on-disk indexes".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        if let Some(rest) = self.index_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.index_path)
    }
}
