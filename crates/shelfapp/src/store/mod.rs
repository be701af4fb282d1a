//! # Storage Layer
//!
//! [`ShelfStore`] is the persistent, keyed collection of shelf entries. It is
//! an explicit service: [`ShelfStore::open`] loads a root directory and
//! [`ShelfStore::close`] persists it. Nothing reaches it through a global.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── index.json            # names of known entries
//! └── <entry-name>/
//!     ├── entry.json        # description, date, lifecycle, binary records
//!     ├── shelved.patch     # unified diff: truth for text changes
//!     └── <payloads>        # copied binary contents
//! ```
//!
//! ## Per-Entry Persistence
//!
//! Every add/update writes only that entry's `entry.json` (atomically) and the
//! small index. A corrupt entry affects nobody else.
//!
//! ## Reconciliation on Open
//!
//! Files are truth, the index is a cache that is allowed to be dirty:
//!
//! 1. **Dropped**: an indexed entry whose `entry.json` is missing or corrupt,
//!    or whose patch file is missing or unparseable, is skipped and logged.
//! 2. **Adopted**: a directory with a valid `entry.json` that the index does
//!    not list is loaded and added to the index.
//! 3. **Recovered**: a directory holding only a parseable patch file (an
//!    interrupted shelve) becomes an entry named after the directory.
//!
//! The index is rewritten when reconciliation changed anything.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, ShelfError};
use crate::model::{EntryFilter, EntryRecord, ShelfEntry};
use crate::patch::PatchCodec;

pub mod directory;
pub mod fs;

use self::fs::{atomic_write, ensure_dir, file_mtime, read_patch, ENTRY_FILE, INDEX_FILE, PATCH_FILE};

/// Outcome of reconciling the disk with the index on open.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub dropped: Vec<String>,
    pub adopted: Vec<String>,
    pub recovered: Vec<String>,
}

#[derive(Debug)]
pub struct ShelfStore {
    root: PathBuf,
    entries: HashMap<String, ShelfEntry>,
}

impl ShelfStore {
    /// Loads the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, codec: &dyn PatchCodec) -> Result<(Self, LoadReport)> {
        let root = root.into();
        ensure_dir(&root)?;

        let indexed = Self::load_index(&root);
        let mut report = LoadReport::default();
        let mut entries = HashMap::new();

        for name in &indexed {
            match Self::load_entry(&root, name, codec) {
                Ok(entry) => {
                    entries.insert(name.clone(), entry);
                }
                Err(err) => {
                    warn!(entry = %name, error = %err, "dropping unreadable shelf");
                    report.dropped.push(name.clone());
                }
            }
        }

        for dir in std::fs::read_dir(&root)? {
            let dir = dir?;
            if !dir.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = dir.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || indexed.contains(&name) {
                continue;
            }
            let path = dir.path();
            if path.join(ENTRY_FILE).is_file() {
                match Self::load_entry(&root, &name, codec) {
                    Ok(entry) => {
                        report.adopted.push(name.clone());
                        entries.insert(name, entry);
                    }
                    Err(err) => debug!(dir = %name, error = %err, "ignoring unreadable directory"),
                }
            } else if path.join(PATCH_FILE).is_file() {
                match Self::recover_entry(&path, &name, codec) {
                    Ok(entry) => {
                        atomic_write(
                            &path.join(ENTRY_FILE),
                            &serde_json::to_vec_pretty(&entry.record())?,
                        )?;
                        report.recovered.push(name.clone());
                        entries.insert(name, entry);
                    }
                    Err(err) => debug!(dir = %name, error = %err, "ignoring unreadable directory"),
                }
            }
        }

        report.loaded = entries.len();
        let store = Self { root, entries };
        if !report.dropped.is_empty() || !report.adopted.is_empty() || !report.recovered.is_empty() {
            store.save_index()?;
        }
        info!(
            root = %store.root.display(),
            loaded = report.loaded,
            dropped = report.dropped.len(),
            adopted = report.adopted.len() + report.recovered.len(),
            "opened shelf store"
        );
        Ok((store, report))
    }

    /// Persists everything and consumes the store.
    pub fn close(self) -> Result<()> {
        self.persist_all()
    }

    fn load_index(root: &Path) -> Vec<String> {
        let path = root.join(INDEX_FILE);
        if !path.exists() {
            return Vec::new();
        }
        let parsed = std::fs::read_to_string(&path)
            .map_err(ShelfError::from)
            .and_then(|text| serde_json::from_str::<Vec<String>>(&text).map_err(ShelfError::from));
        match parsed {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "shelf index unreadable, rebuilding from directories");
                Vec::new()
            }
        }
    }

    fn load_entry(root: &Path, name: &str, codec: &dyn PatchCodec) -> Result<ShelfEntry> {
        let dir = root.join(name);
        let text = std::fs::read_to_string(dir.join(ENTRY_FILE))?;
        let record: EntryRecord = serde_json::from_str(&text)?;
        if record.name != name {
            return Err(ShelfError::Store(format!(
                "entry.json names '{}' but lives in '{}'",
                record.name, name
            )));
        }
        let mut entry = ShelfEntry::from_record(record, dir);
        entry.load_changes(codec)?;
        Ok(entry)
    }

    fn recover_entry(dir: &Path, name: &str, codec: &dyn PatchCodec) -> Result<ShelfEntry> {
        let patch_path = dir.join(PATCH_FILE);
        let parsed = read_patch(&patch_path, codec)?;
        let date: DateTime<Utc> = file_mtime(&patch_path)?
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        let mut entry = ShelfEntry::new(name, dir, name, date);
        entry.set_changes(&parsed.patches);
        Ok(entry)
    }

    fn save_index(&self) -> Result<()> {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        atomic_write(
            &self.root.join(INDEX_FILE),
            &serde_json::to_vec_pretty(&names)?,
        )
    }

    fn save_entry(&self, entry: &ShelfEntry) -> Result<()> {
        atomic_write(
            &entry.dir().join(ENTRY_FILE),
            &serde_json::to_vec_pretty(&entry.record())?,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `name` is used by an entry, ignoring case.
    pub fn is_taken(&self, name: &str) -> bool {
        self.entries.keys().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn add(&mut self, entry: ShelfEntry) -> Result<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(ShelfError::Store(format!(
                "a shelf named '{}' already exists",
                entry.name
            )));
        }
        self.save_entry(&entry)?;
        self.entries.insert(entry.name.clone(), entry);
        self.save_index()
    }

    /// Replaces a known entry and persists it.
    pub fn update(&mut self, entry: ShelfEntry) -> Result<()> {
        if !self.entries.contains_key(&entry.name) {
            return Err(ShelfError::EntryNotFound(entry.name));
        }
        self.save_entry(&entry)?;
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Removes an entry and deletes its directory.
    pub fn remove(&mut self, name: &str) -> Result<ShelfEntry> {
        let entry = self
            .entries
            .remove(name)
            .ok_or_else(|| ShelfError::EntryNotFound(name.to_string()))?;
        self.save_index()?;
        if entry.dir().exists() {
            std::fs::remove_dir_all(entry.dir())?;
        }
        Ok(entry)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ShelfEntry> {
        self.entries.get(name)
    }

    pub fn get(&self, name: &str) -> Result<&ShelfEntry> {
        self.find_by_name(name)
            .ok_or_else(|| ShelfError::EntryNotFound(name.to_string()))
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut ShelfEntry> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| ShelfError::EntryNotFound(name.to_string()))
    }

    /// Snapshot of every entry, in no particular order.
    pub fn all(&self) -> Vec<ShelfEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn list(&self, filter: EntryFilter) -> Vec<ShelfEntry> {
        self.entries
            .values()
            .filter(|e| filter.matches(&e.lifecycle))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn persist_all(&self) -> Result<()> {
        for entry in self.entries.values() {
            self.save_entry(entry)?;
        }
        self.save_index()
    }
}
