//! # Patches
//!
//! Shelved text changes are stored as unified diffs. This module holds the
//! in-memory patch model and the seams the engine talks to:
//!
//! - [`PatchCodec`]: turns a list of [`FilePatch`] into patch file text and back.
//! - [`PatchExtension`]: side-channel metadata carried in the patch file
//!   (e.g. base revision text), encoded from and decoded into a [`PatchContext`].
//! - [`PatchBuilder`]: produces file patches from working-copy changes.
//!
//! Default implementations live in the submodules: [`unified::UnifiedDiffCodec`],
//! [`base_revision::BaseRevisionExtension`] and [`builder::ContextDiffBuilder`].
//! Hunk application and content reconstruction live in [`apply`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::change::Change;
use crate::error::Result;

pub mod apply;
pub mod base_revision;
pub mod builder;
pub mod unified;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl FileStatus {
    pub fn from_paths(before: Option<&str>, after: Option<&str>) -> Self {
        match (before, after) {
            (None, _) => Self::Added,
            (_, None) => Self::Deleted,
            _ => Self::Modified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Removed,
    Added,
}

impl LineKind {
    fn prefix(self) -> char {
        match self {
            Self::Context => ' ',
            Self::Removed => '-',
            Self::Added => '+',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLine {
    pub kind: LineKind,
    pub text: String,
    /// The line is the last one of its file and has no trailing newline.
    pub no_newline: bool,
}

impl PatchLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            no_newline: false,
        }
    }

    pub fn in_old(&self) -> bool {
        self.kind != LineKind::Added
    }

    pub fn in_new(&self) -> bool {
        self.kind != LineKind::Removed
    }
}

/// One `@@ -old_start,old_len +new_start,new_len @@` block.
///
/// Starts are 1-based; a zero-length side uses the number of the line
/// *before* the insertion point, as unified diff does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<PatchLine>,
}

impl Hunk {
    pub fn old_lines(&self) -> impl Iterator<Item = &PatchLine> {
        self.lines.iter().filter(|l| l.in_old())
    }

    pub fn new_lines(&self) -> impl Iterator<Item = &PatchLine> {
        self.lines.iter().filter(|l| l.in_new())
    }

    fn reversed(&self) -> Self {
        Self {
            old_start: self.new_start,
            old_len: self.new_len,
            new_start: self.old_start,
            new_len: self.old_len,
            lines: self
                .lines
                .iter()
                .map(|l| PatchLine {
                    kind: match l.kind {
                        LineKind::Added => LineKind::Removed,
                        LineKind::Removed => LineKind::Added,
                        LineKind::Context => LineKind::Context,
                    },
                    ..l.clone()
                })
                .collect(),
        }
    }
}

/// The text change of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub before_path: Option<String>,
    pub after_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn status(&self) -> FileStatus {
        FileStatus::from_paths(self.before_path.as_deref(), self.after_path.as_deref())
    }

    /// Path used to match this patch against selections: before path, or
    /// after path for additions.
    pub fn key_path(&self) -> &str {
        self.before_path
            .as_deref()
            .or(self.after_path.as_deref())
            .unwrap_or_default()
    }

    /// The patch that undoes this one.
    pub fn reversed(&self) -> Self {
        Self {
            before_path: self.after_path.clone(),
            after_path: self.before_path.clone(),
            hunks: self.hunks.iter().map(Hunk::reversed).collect(),
        }
    }
}

/// Out-of-band data travelling with a patch file.
///
/// Known data (base revisions) has typed accessors; payloads of extensions
/// nobody registered are kept as-is so rewriting a file never drops them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchContext {
    base_revisions: BTreeMap<String, String>,
    pub(crate) unknown: BTreeMap<String, serde_json::Value>,
}

impl PatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_revision(&self, path: &str) -> Option<&str> {
        self.base_revisions.get(path).map(String::as_str)
    }

    pub fn set_base_revision(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.base_revisions.insert(path.into(), text.into());
    }

    pub fn base_revisions(&self) -> &BTreeMap<String, String> {
        &self.base_revisions
    }

    pub fn is_empty(&self) -> bool {
        self.base_revisions.is_empty() && self.unknown.is_empty()
    }

    /// Copy of this context restricted to the given patches' paths.
    pub fn restricted_to(&self, patches: &[FilePatch]) -> Self {
        let base_revisions = self
            .base_revisions
            .iter()
            .filter(|(path, _)| patches.iter().any(|p| p.key_path() == path.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            base_revisions,
            unknown: self.unknown.clone(),
        }
    }

    pub fn merge(&mut self, other: PatchContext) {
        self.base_revisions.extend(other.base_revisions);
        self.unknown.extend(other.unknown);
    }
}

/// A patch file decoded into patches plus its side-channel context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPatch {
    pub patches: Vec<FilePatch>,
    pub context: PatchContext,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct PatchParseError {
    pub line: usize,
    pub message: String,
}

/// Capability interface for patch metadata side-channels.
pub trait PatchExtension: Send + Sync {
    /// Identifier written into the patch file. Must not contain whitespace.
    fn name(&self) -> &'static str;

    /// Payload to write, or `None` when the context holds nothing for this extension.
    fn encode(&self, ctx: &PatchContext) -> Option<serde_json::Value>;

    fn decode(
        &self,
        payload: serde_json::Value,
        ctx: &mut PatchContext,
    ) -> std::result::Result<(), String>;
}

pub trait PatchCodec: Send + Sync {
    fn encode(&self, patches: &[FilePatch], ctx: &PatchContext) -> String;

    fn decode(&self, text: &str) -> std::result::Result<ParsedPatch, PatchParseError>;
}

/// Produces file patches for text changes.
pub trait PatchBuilder: Send + Sync {
    fn build(&self, changes: &[Change]) -> Result<Vec<FilePatch>>;
}
