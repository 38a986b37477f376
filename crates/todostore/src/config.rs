//! # Configuration
//!
//! Store configuration is loaded with [`confique`] from layered sources.
//!
//! ## Resolution Order
//!
//! Highest priority first:
//! 1. **Programmatic overrides**: fields set by the caller after loading (the CLI's
//!    `--data-file`, `--wal-file` and `--backups` flags).
//! 2. **Environment variables**: `DATA_FILE`, `WAL_FILE`, `BACKUP_COUNT`, `SNAPSHOT_EVERY`,
//!    `LOG_LEVEL`.
//! 3. **TOML file**: an explicit path, or `todostore.toml` in the working directory.
//! 4. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Env | Default | Description |
//! |-----|-----|---------|-------------|
//! | `data_file` | `DATA_FILE` | `./data/appdata.json` | Main snapshot file |
//! | `wal_file` | `WAL_FILE` | `./data/appdata.wal` | Write-ahead log |
//! | `backup_count` | `BACKUP_COUNT` | `10` | Rotating backups kept next to the data file |
//! | `snapshot_every` | `SNAPSHOT_EVERY` | `100` | WAL entries before an automatic checkpoint (`0` = never) |
//! | `log_level` | `LOG_LEVEL` | `warn` | Default log filter for the CLI |

use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

/// File name looked up in the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "todostore.toml";

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path to the main JSON snapshot.
    #[config(env = "DATA_FILE", default = "./data/appdata.json")]
    pub data_file: PathBuf,

    /// Path to the line-delimited JSON write-ahead log.
    #[config(env = "WAL_FILE", default = "./data/appdata.wal")]
    pub wal_file: PathBuf,

    /// Number of rotating backups (`<data_file>.bak.1` is the newest).
    #[config(env = "BACKUP_COUNT", default = 10)]
    pub backup_count: usize,

    /// WAL entries after which a mutation triggers a checkpoint. 0 disables it.
    #[config(env = "SNAPSHOT_EVERY", default = 100)]
    pub snapshot_every: u64,

    /// Log filter used when `RUST_LOG` is unset.
    #[config(env = "LOG_LEVEL", default = "warn")]
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("./data/appdata.json"),
            wal_file: PathBuf::from("./data/appdata.wal"),
            backup_count: 10,
            snapshot_every: 100,
            log_level: "warn".to_string(),
        }
    }
}

impl StoreConfig {
    /// Loads environment variables over an optional TOML file over defaults.
    ///
    /// An explicit `path` must exist. Without one, `todostore.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) if !p.is_file() => {
                return Err(StoreError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )))
            }
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        StoreConfig::builder()
            .env()
            .file(&file)
            .load()
            .map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Default file names placed inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            data_file: dir.join("appdata.json"),
            wal_file: dir.join("appdata.wal"),
            ..Default::default()
        }
    }

    pub fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.data_file.as_os_str().to_os_string();
        name.push(format!(".bak.{}", n));
        PathBuf::from(name)
    }
}
