//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - Temporary store roots
//! - A config file pointing at that root
//!
//! # Usage
//!
//! ```ignore
//! use fstore_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let config = fstore_config::Config::load_from(&env.config_path).unwrap();
//!     assert_eq!(config.storage.root, env.store_root);
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with its own store root and config file
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Isolated store root directory (not created)
    pub store_root: PathBuf,
    /// Config file whose `storage.root` is `store_root`
    pub config_path: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment with a 1h GC lifetime
    pub fn new() -> anyhow::Result<Self> {
        Self::with_lifetime("1h")
    }

    pub fn with_lifetime(lifetime: &str) -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let store_root = root.join(format!("blobs-{}", test_id));
        let config_path = root.join("config.toml");

        let mut config = Config::default();
        config.storage.root = store_root.clone();
        config.gc.lifetime = lifetime.to_string();
        std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        Ok(Self {
            _temp_dir: temp_dir,
            store_root,
            config_path,
            test_id,
        })
    }
}
