//! Per-entry directories.
//!
//! Directory names come from the user's description: unsafe characters
//! become `_`, runs of `_` collapse, and the result is cut to the configured
//! length. Collisions get a numeric suffix (`fix`, `fix_1`, `fix_2`, ...).
//! Names are compared case-insensitively so the store behaves the same on
//! case-folding filesystems.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::fs::{ENTRY_FILE, INDEX_FILE, PATCH_FILE};

const FALLBACK_NAME: &str = "shelved_changes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfDirectory {
    name: String,
    path: PathBuf,
}

pub fn sanitize(description: &str, max_len: usize) -> String {
    let mut out = String::new();
    for c in description.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let cut: String = out.chars().take(max_len.max(1)).collect();
    let cut = cut.trim_matches(|c| c == '_' || c == '.');
    if cut.is_empty() {
        FALLBACK_NAME.chars().take(max_len.max(1)).collect()
    } else {
        cut.to_string()
    }
}

/// Names the store keeps for itself at its root: the index and the
/// dot-prefixed temp files of atomic writes.
fn reserved_at_root(name: &str) -> bool {
    name.eq_ignore_ascii_case(INDEX_FILE) || name.starts_with('.')
}

impl ShelfDirectory {
    /// Creates a fresh directory under `root`. `taken` reports names already
    /// used by the store; names present on disk are skipped too.
    pub fn allocate(
        root: &Path,
        description: &str,
        max_len: usize,
        taken: impl Fn(&str) -> bool,
    ) -> Result<Self> {
        let base = sanitize(description, max_len);
        let on_disk: Vec<String> = match fs::read_dir(root) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().map(str::to_lowercase))
                .collect(),
            Err(_) => Vec::new(),
        };

        let mut candidate = base.clone();
        let mut n = 0;
        while reserved_at_root(&candidate)
            || taken(&candidate)
            || on_disk.contains(&candidate.to_lowercase())
        {
            n += 1;
            candidate = format!("{}_{}", base, n);
        }

        let path = root.join(&candidate);
        fs::create_dir_all(&path)?;
        Ok(Self {
            name: candidate,
            path,
        })
    }

    /// Wraps a directory that already belongs to an entry.
    pub fn existing(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path: path.to_path_buf(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_parts(self) -> (String, PathBuf) {
        (self.name, self.path)
    }

    fn payload_name(&self, repo_path: &str) -> String {
        let file = repo_path.rsplit('/').next().unwrap_or(repo_path);
        let file = if file.is_empty() { "binary" } else { file };
        let reserved = |name: &str| name == PATCH_FILE || name == ENTRY_FILE;

        let mut candidate = file.to_string();
        let mut n = 0;
        while reserved(&candidate) || self.path.join(&candidate).exists() {
            n += 1;
            candidate = match file.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, n, ext),
                _ => format!("{}_{}", file, n),
            };
        }
        candidate
    }

    /// Stores a binary payload for `repo_path`; returns its file name.
    pub fn store_payload(&self, repo_path: &str, bytes: &[u8]) -> Result<String> {
        let name = self.payload_name(repo_path);
        fs::write(self.path.join(&name), bytes)?;
        Ok(name)
    }

    /// Copies a payload from another entry's directory; returns its file name here.
    pub fn copy_payload(&self, repo_path: &str, source: &Path) -> Result<String> {
        let name = self.payload_name(repo_path);
        fs::copy(source, self.path.join(&name))?;
        Ok(name)
    }

    /// Removes the directory and everything in it.
    pub fn discard(self) -> Result<()> {
        if self.path.exists() {
            fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}
