//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated storage root
//! - A matching `Config` and on-disk config file
//!
//! # Usage
//!
//! ```ignore
//! use nodefs_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     // env.storage_root and env.config_path are unique to this test
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with a private storage root
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Storage root containing `spaces/`
    pub storage_root: PathBuf,
    /// Location of the config file written by [`TestEnvironment::write_config`]
    pub config_path: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let storage_root = root.join("storage");
        let config_dir = root.join(".nodefs");
        std::fs::create_dir_all(&storage_root)?;
        std::fs::create_dir_all(&config_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            storage_root,
            config_path: config_dir.join("config.toml"),
            test_id,
        })
    }

    /// Config pointing at this environment's storage root
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.storage.root = self.storage_root.clone();
        // keep lock waits short so contention tests fail fast
        cfg.lock.initial_delay_ms = 1;
        cfg
    }

    /// Persist [`TestEnvironment::config`] to `config_path`
    pub fn write_config(&self) -> anyhow::Result<PathBuf> {
        std::fs::write(&self.config_path, self.config().to_toml()?)?;
        Ok(self.config_path.clone())
    }

    /// Path of the `spaces/` directory under the storage root
    pub fn spaces_dir(&self) -> PathBuf {
        self.storage_root.join("spaces")
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creates_directories() {
        let env = TestEnvironment::new().unwrap();
        assert!(env.storage_root.exists());
        assert!(env.config_path.parent().unwrap().exists());
    }

    #[test]
    fn test_environment_has_unique_roots() {
        let env1 = TestEnvironment::new().unwrap();
        let env2 = TestEnvironment::new().unwrap();
        assert_ne!(env1.storage_root, env2.storage_root);
        assert_ne!(env1.test_id, env2.test_id);
    }

    #[test]
    fn test_write_config_roundtrip() {
        let env = TestEnvironment::new().unwrap();
        let path = env.write_config().unwrap();
        let loaded = Config::load_file(&path).unwrap();
        assert_eq!(loaded.storage.root, env.storage_root);
        assert_eq!(loaded.lock.initial_delay_ms, 1);
    }
}
