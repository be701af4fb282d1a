//! # Configuration
//!
//! Engine settings are a [`confique`] config, loaded in priority order:
//!
//! 1. **Environment variables**: `SHELF_RETENTION_DAYS`, `SHELF_BATCH_SIZE`, etc.
//! 2. **Config file**: `shelf.toml`, by default in the OS config directory
//!    (via `directories`). A missing file is not an error.
//! 3. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `retention_days` | `7` | Age after which Deleted entries are purged |
//! | `janitor_interval_secs` | `86400` | Delay between janitor runs |
//! | `batch_size` | `100` | Text changes per shelve batch |
//! | `max_name_length` | `50` | Longest generated directory name |
//! | `preload_base_revisions` | `false` | Store base file text in patch files |

use std::path::{Path, PathBuf};
use std::time::Duration;

use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const CONFIG_FILE: &str = "shelf.toml";

/// Configuration for the shelf engine, stored in `shelf.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShelfConfig {
    /// Days a Deleted entry is kept before the janitor purges it.
    #[config(default = 7, env = "SHELF_RETENTION_DAYS")]
    pub retention_days: u32,

    /// Seconds between two janitor runs.
    #[config(default = 86400, env = "SHELF_JANITOR_INTERVAL_SECS")]
    pub janitor_interval_secs: u64,

    /// Text changes handed to the patch builder at once while shelving.
    #[config(default = 100, env = "SHELF_BATCH_SIZE")]
    pub batch_size: usize,

    /// Longest directory name generated from a description.
    #[config(default = 50, env = "SHELF_MAX_NAME_LENGTH")]
    pub max_name_length: usize,

    /// Keep the base text of every shelved file inside the patch file.
    #[config(default = false, env = "SHELF_PRELOAD_BASE_REVISIONS")]
    pub preload_base_revisions: bool,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            janitor_interval_secs: 86400,
            batch_size: 100,
            max_name_length: 50,
            preload_base_revisions: false,
        }
    }
}

impl ShelfConfig {
    /// Loads from the environment and the default config file.
    pub fn load() -> Result<Self> {
        match config_dir() {
            Some(dir) => Self::load_from(&dir.join(CONFIG_FILE)),
            None => Ok(Self::builder().env().load()?),
        }
    }

    /// Loads from the environment and `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self::builder().env().file(path).load()?)
    }

    /// A commented `shelf.toml` listing every setting and its default.
    pub fn template() -> String {
        confique::toml::template::<Self>(confique::toml::FormatOptions::default())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    /// Batch size, never zero.
    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "shelfapp", "shelf")
}

fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default store root: `shelves/` in the OS data directory.
pub fn default_root() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("shelves"))
}
