use crate::config::StoreConfig;
use crate::store::Store;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestEnv {
    // Keeps the directory alive until the test is done
    pub _temp_dir: TempDir,
    pub config: StoreConfig,
    pub root: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let config = StoreConfig {
            backup_count: 3,
            ..StoreConfig::in_dir(root.join("data"))
        };
        Self {
            _temp_dir: temp_dir,
            config,
            root,
        }
    }

    /// Opens a store on this environment's files.
    pub fn open(&self) -> Store {
        Store::open(self.config.clone())
            .expect("failed to open store")
            .0
    }
}
