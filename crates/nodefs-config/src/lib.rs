//! # nodefs-config
//!
//! Configuration management for nodefs.
//!
//! Loads configuration from:
//! 1. `~/.nodefs/config.toml` (global)
//! 2. `.nodefs/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! There is no process-wide instance. Binaries load a [`Config`] once and
//! hand the relevant sections to the storage layer constructors.

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default storage root, tilde-expanded at load time
pub const DEFAULT_STORAGE_ROOT: &str = "~/.nodefs/storage";

/// Default cap on grants stored on a single node.
///
/// An ACE attribute costs roughly 80 bytes; with ext4 limiting all extended
/// attributes of an inode to one 4 KiB block this leaves room for ~50 grants.
pub const DEFAULT_MAX_GRANTS_PER_NODE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub lock: LockConfig,
    pub acl: AclConfig,
    pub tree: TreeConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Global config (~/.nodefs/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::load_file(&global_path)?;
            }
        }

        // 2. Project config (.nodefs/config.toml) overrides global
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_config = Self::load_file(&project_path)?;
            config.merge(project_config);
        }

        // 3. Environment
        config.apply_env_overrides();
        config.storage.root = path::expand_tilde(&config.storage.root);

        Ok(config)
    }

    /// Parse a single config file without applying env overrides
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.nodefs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".nodefs/config.toml"))
    }

    /// Project config path: ./.nodefs/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".nodefs/config.toml")
    }

    /// Merge a project config over this one.
    ///
    /// Only sections that differ from the defaults replace the global values.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();
        if other.storage.root != defaults.storage.root {
            self.storage.root = other.storage.root;
        }
        if other.storage.metadata_backend != defaults.storage.metadata_backend {
            self.storage.metadata_backend = other.storage.metadata_backend;
        }
        if other.lock != defaults.lock {
            self.lock = other.lock;
        }
        if other.acl != defaults.acl {
            self.acl = other.acl;
        }
        if other.tree != defaults.tree {
            self.tree = other.tree;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("NODEFS_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(retries) = std::env::var("NODEFS_LOCK_RETRIES") {
            if let Ok(n) = retries.parse() {
                self.lock.max_retries = n;
            }
        }
        if let Ok(max) = std::env::var("NODEFS_MAX_GRANTS") {
            if let Ok(n) = max.parse() {
                self.acl.max_grants_per_node = n;
            }
        }
    }

    /// Render this config as pretty TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Config::default().to_toml()
    }
}

/// Which attribute backend persists node records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackendKind {
    /// One bincode record file next to each node (`<node>.meta`)
    #[default]
    Sidecar,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding `spaces/`
    pub root: PathBuf,
    /// Metadata backend used for node records
    pub metadata_backend: MetadataBackendKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            metadata_backend: MetadataBackendKind::Sidecar,
        }
    }
}

/// Advisory lock acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Non-blocking attempts before the final blocking attempt
    pub max_retries: u32,
    /// First backoff delay, doubled after every failed attempt
    pub initial_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 10,
        }
    }
}

/// Access control limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Maximum number of grants per node, 0 disables the cap
    pub max_grants_per_node: usize,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            max_grants_per_node: DEFAULT_MAX_GRANTS_PER_NODE,
        }
    }
}

impl AclConfig {
    /// The configured cap, `None` when unlimited
    pub fn grant_limit(&self) -> Option<usize> {
        match self.max_grants_per_node {
            0 => None,
            n => Some(n),
        }
    }
}

/// Tree traversal tuning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Worker threads for folder listings, 0 uses the global rayon pool
    pub list_concurrency: usize,
}
