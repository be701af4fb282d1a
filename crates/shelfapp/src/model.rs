//! # Domain Model
//!
//! A [`ShelfEntry`] is the durable result of one shelving operation. Its
//! identity is the generated directory `name`; the `description` is free text
//! the user can change at any time.
//!
//! ## Text Changes Are Derived
//!
//! The entry's patch file is the source of truth for its text changes. The
//! [`ChangeRecord`] list is a cache over it, modelled explicitly:
//!
//! ```text
//! Unloaded ──load──► Loaded { records, mtime }
//!     │                  │  patch file mtime differs → reload
//!     └──load fails──► LoadError(message)
//! ```
//!
//! Every access compares the patch file's modification time with the cached
//! one, so an edit made underneath the cache is picked up.
//!
//! ## Binary Changes Are Stored
//!
//! Binary files cannot go into a unified diff. Their after-content is copied
//! into the entry directory and described by a [`BinaryRecord`] in
//! `entry.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Result, ShelfError};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::patch::{FilePatch, FileStatus, PatchCodec};
use crate::store::fs::{file_mtime, read_patch, PATCH_FILE};

/// One shelved text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub before_path: Option<String>,
    pub after_path: Option<String>,
    pub status: FileStatus,
}

impl ChangeRecord {
    pub fn from_patch(patch: &FilePatch) -> Self {
        Self {
            before_path: patch.before_path.clone(),
            after_path: patch.after_path.clone(),
            status: patch.status(),
        }
    }

    /// Selection key: before path, or after path for additions.
    pub fn key_path(&self) -> &str {
        self.before_path
            .as_deref()
            .or(self.after_path.as_deref())
            .unwrap_or_default()
    }
}

/// One shelved binary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRecord {
    pub before_path: Option<String>,
    pub after_path: Option<String>,
    /// File name of the copied payload inside the entry directory.
    /// Absent when the change deletes the file.
    pub payload: Option<String>,
}

impl BinaryRecord {
    pub fn status(&self) -> FileStatus {
        FileStatus::from_paths(self.before_path.as_deref(), self.after_path.as_deref())
    }

    pub fn key_path(&self) -> &str {
        self.before_path
            .as_deref()
            .or(self.after_path.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChangesCache {
    #[default]
    Unloaded,
    Loaded {
        records: Vec<ChangeRecord>,
        mtime: Option<SystemTime>,
    },
    LoadError(String),
}

/// Which entries an enumeration returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryFilter {
    #[default]
    Active,
    Recycled,
    Deleted,
    All,
}

impl EntryFilter {
    pub fn matches(&self, lifecycle: &Lifecycle) -> bool {
        match self {
            Self::Active => lifecycle.state() == LifecycleState::Active,
            Self::Recycled => lifecycle.state() == LifecycleState::Recycled,
            Self::Deleted => lifecycle.state() == LifecycleState::Deleted,
            Self::All => lifecycle.state() != LifecycleState::Purged,
        }
    }
}

/// The persisted part of an entry (`entry.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    pub name: String,
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub binaries: Vec<BinaryRecord>,
}

#[derive(Debug, Clone)]
pub struct ShelfEntry {
    pub name: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub lifecycle: Lifecycle,
    pub binaries: Vec<BinaryRecord>,
    dir: PathBuf,
    changes: ChangesCache,
}

impl ShelfEntry {
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        description: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            date,
            lifecycle: Lifecycle::default(),
            binaries: Vec::new(),
            dir: dir.into(),
            changes: ChangesCache::Unloaded,
        }
    }

    pub fn from_record(record: EntryRecord, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: record.name,
            description: record.description,
            date: record.date,
            lifecycle: record.lifecycle,
            binaries: record.binaries,
            dir: dir.into(),
            changes: ChangesCache::Unloaded,
        }
    }

    pub fn record(&self) -> EntryRecord {
        EntryRecord {
            name: self.name.clone(),
            description: self.description.clone(),
            date: self.date,
            lifecycle: self.lifecycle,
            binaries: self.binaries.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn patch_path(&self) -> PathBuf {
        self.dir.join(PATCH_FILE)
    }

    pub fn payload_path(&self, binary: &BinaryRecord) -> Option<PathBuf> {
        binary.payload.as_ref().map(|p| self.dir.join(p))
    }

    pub fn cache(&self) -> &ChangesCache {
        &self.changes
    }

    /// Records from the cache, without touching the disk.
    pub fn cached_changes(&self) -> Option<&[ChangeRecord]> {
        match &self.changes {
            ChangesCache::Loaded { records, .. } => Some(records),
            _ => None,
        }
    }

    /// Seeds the cache after this process wrote the patch file itself.
    pub fn set_changes(&mut self, patches: &[FilePatch]) {
        self.changes = ChangesCache::Loaded {
            records: patches.iter().map(ChangeRecord::from_patch).collect(),
            mtime: file_mtime(&self.patch_path()).ok().flatten(),
        };
    }

    pub fn invalidate(&mut self) {
        self.changes = ChangesCache::Unloaded;
    }

    /// Whether the cache can be trusted without rereading the patch file.
    pub fn is_fresh(&self) -> bool {
        match &self.changes {
            ChangesCache::Loaded { mtime, .. } => {
                file_mtime(&self.patch_path()).ok().flatten() == *mtime
            }
            _ => false,
        }
    }

    /// Change records, reloaded from the patch file when the cache is stale.
    pub fn load_changes(&mut self, codec: &dyn PatchCodec) -> Result<&[ChangeRecord]> {
        if !self.is_fresh() {
            self.changes = match read_patch(&self.patch_path(), codec) {
                Ok(parsed) => ChangesCache::Loaded {
                    records: parsed.patches.iter().map(ChangeRecord::from_patch).collect(),
                    mtime: file_mtime(&self.patch_path())?,
                },
                Err(err) => ChangesCache::LoadError(err.to_string()),
            };
        }
        match &self.changes {
            ChangesCache::Loaded { records, .. } => Ok(records),
            ChangesCache::LoadError(message) => {
                Err(ShelfError::corrupt(self.patch_path(), message.clone()))
            }
            ChangesCache::Unloaded => Err(ShelfError::Store(format!(
                "changes of '{}' are not loaded",
                self.name
            ))),
        }
    }

    /// Number of text and binary records, when the text side is cached.
    pub fn total_records(&self) -> Option<usize> {
        self.cached_changes()
            .map(|records| records.len() + self.binaries.len())
    }

    /// True when the loaded patch and the binaries hold nothing.
    pub fn is_empty(&self) -> bool {
        self.total_records() == Some(0)
    }
}
