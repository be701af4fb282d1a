//! # Working Copy and Patch Application
//!
//! The engine never edits user files directly. It goes through two seams:
//!
//! - [`WorkingCopy`]: raw file access plus rolling back shelved changes.
//! - [`PatchApplier`]: applies shelved text patches and binary payloads,
//!   reporting which files were applied and which conflicted.
//!
//! [`FsWorkingCopy`] and [`WorkingCopyApplier`] are the plain filesystem
//! implementations. Hosts with a real VCS integration plug in their own.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::change::{Change, Content};
use crate::error::{Result, ShelfError};
use crate::patch::apply::apply_hunks;
use crate::patch::{FilePatch, PatchContext};
use crate::progress::{CancellationToken, Progress};

pub trait WorkingCopy: Send + Sync {
    /// Reads a file. `Ok(None)` when it does not exist.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Removes a file. Missing files are not an error.
    fn remove(&self, path: &str) -> Result<()>;

    fn read_text(&self, path: &str) -> Result<Option<String>> {
        match self.read(path)? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
                ShelfError::Store(format!("'{}' is not valid UTF-8", path))
            }),
        }
    }

    /// Puts the working copy back to the `before` side of each change.
    fn rollback(&self, changes: &[Change]) -> Result<()> {
        for change in changes {
            if let Some(after) = &change.after {
                let renamed = change.before.as_ref().is_some_and(|b| b.path != after.path);
                if change.before.is_none() || renamed {
                    self.remove(&after.path)?;
                }
            }
            if let Some(before) = &change.before {
                if !matches!(before.content, Content::Directory) {
                    self.write(&before.path, before.content.bytes())?;
                }
            }
        }
        Ok(())
    }
}

impl<T: WorkingCopy + ?Sized> WorkingCopy for std::sync::Arc<T> {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        (**self).read(path)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        (**self).write(path, bytes)
    }

    fn remove(&self, path: &str) -> Result<()> {
        (**self).remove(path)
    }

    fn rollback(&self, changes: &[Change]) -> Result<()> {
        (**self).rollback(changes)
    }
}

/// Checks that `path` names something inside the working copy: relative,
/// non-empty, and without `..` or root components.
pub fn check_relative(path: &str) -> Result<()> {
    let inside = !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if inside {
        Ok(())
    } else {
        Err(ShelfError::UnsafePath(path.to_string()))
    }
}

/// Working copy rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsWorkingCopy {
    root: PathBuf,
}

impl FsWorkingCopy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        check_relative(path)?;
        Ok(self.root.join(path))
    }
}

impl WorkingCopy for FsWorkingCopy {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(full)?))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, bytes)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if full.exists() {
            fs::remove_file(full)?;
        }
        Ok(())
    }
}

/// A binary change expressed as a pseudo-patch for the applier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPatch {
    pub before_path: Option<String>,
    pub after_path: Option<String>,
    /// Absolute path of the shelved payload, absent for deletions.
    pub payload: Option<PathBuf>,
}

impl BinaryPatch {
    pub fn key_path(&self) -> &str {
        self.before_path
            .as_deref()
            .or(self.after_path.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConflict {
    pub path: String,
    pub reason: String,
}

/// What the applier did, keyed by each patch's key path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub conflicts: Vec<FileConflict>,
    /// Cancellation stopped the run; files after the last applied one were
    /// not touched.
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn was_applied(&self, key_path: &str) -> bool {
        self.applied.iter().any(|p| p == key_path)
    }

    fn stop_at(&mut self, path: &str, err: &ShelfError) {
        warn!(path, error = %err, "stopped applying shelved changes");
        self.conflicts.push(FileConflict {
            path: path.to_string(),
            reason: err.to_string(),
        });
    }
}

pub struct ApplyRequest<'a> {
    pub patches: &'a [FilePatch],
    pub binaries: &'a [BinaryPatch],
    pub context: &'a PatchContext,
    /// Changelist the applied files should land in, when the host has such a concept.
    pub destination: Option<&'a str>,
}

pub trait PatchApplier: Send + Sync {
    fn apply(
        &self,
        request: ApplyRequest<'_>,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport>;
}

/// Applies patches straight onto a [`WorkingCopy`]. Hunks that do not match
/// are reported as conflicts and the file is left untouched.
pub struct WorkingCopyApplier<W> {
    working_copy: W,
}

impl<W: WorkingCopy> WorkingCopyApplier<W> {
    pub fn new(working_copy: W) -> Self {
        Self { working_copy }
    }

    fn apply_text(&self, patch: &FilePatch) -> Result<std::result::Result<(), String>> {
        let current = match &patch.before_path {
            Some(path) => match self.working_copy.read_text(path)? {
                Some(text) => text,
                None => return Ok(Err(format!("'{}' does not exist", path))),
            },
            None => String::new(),
        };
        if patch.before_path.is_none() {
            if let Some(after) = &patch.after_path {
                if self.working_copy.read(after)?.is_some() {
                    return Ok(Err(format!("'{}' already exists", after)));
                }
            }
        }

        let patched = match apply_hunks(&current, &patch.hunks) {
            Ok(text) => text,
            Err(reason) => return Ok(Err(reason)),
        };
        if let (Some(before), Some(after)) = (&patch.before_path, &patch.after_path) {
            if before != after {
                self.working_copy.remove(before)?;
            }
        }
        match &patch.after_path {
            Some(after) => self.working_copy.write(after, patched.as_bytes())?,
            None => {
                if let Some(before) = &patch.before_path {
                    self.working_copy.remove(before)?;
                }
            }
        }
        Ok(Ok(()))
    }

    fn apply_binary(&self, binary: &BinaryPatch) -> Result<()> {
        if let (Some(before), Some(after)) = (&binary.before_path, &binary.after_path) {
            if before != after {
                self.working_copy.remove(before)?;
            }
        }
        match (&binary.after_path, &binary.payload) {
            (Some(after), Some(payload)) => {
                let bytes = fs::read(payload)?;
                self.working_copy.write(after, &bytes)?;
            }
            _ => {
                if let Some(before) = &binary.before_path {
                    self.working_copy.remove(before)?;
                }
            }
        }
        Ok(())
    }
}

impl<W: WorkingCopy> PatchApplier for WorkingCopyApplier<W> {
    /// Applies text patches, then binaries. Hunk mismatches are reported
    /// and skipped. Cancellation or a file that cannot be read or written
    /// stops the run; the report still lists everything applied before it.
    fn apply(
        &self,
        request: ApplyRequest<'_>,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        let total = request.patches.len() + request.binaries.len();
        let mut done = 0;

        'files: {
            for patch in request.patches {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'files;
                }
                progress.report(done, total, patch.key_path());
                match self.apply_text(patch) {
                    Ok(Ok(())) => report.applied.push(patch.key_path().to_string()),
                    Ok(Err(reason)) => {
                        warn!(path = patch.key_path(), %reason, "patch does not apply");
                        report.conflicts.push(FileConflict {
                            path: patch.key_path().to_string(),
                            reason,
                        });
                    }
                    Err(err) => {
                        report.stop_at(patch.key_path(), &err);
                        break 'files;
                    }
                }
                done += 1;
            }

            for binary in request.binaries {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'files;
                }
                progress.report(done, total, binary.key_path());
                if let Err(err) = self.apply_binary(binary) {
                    report.stop_at(binary.key_path(), &err);
                    break 'files;
                }
                report.applied.push(binary.key_path().to_string());
                done += 1;
            }
        }

        debug!(
            applied = report.applied.len(),
            conflicts = report.conflicts.len(),
            cancelled = report.cancelled,
            destination = request.destination.unwrap_or_default(),
            "applied shelved changes"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Revision;
    use crate::patch::builder::ContextDiffBuilder;
    use crate::progress::NoProgress;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FsWorkingCopy) {
        let dir = TempDir::new().unwrap();
        let wc = FsWorkingCopy::new(dir.path());
        (dir, wc)
    }

    fn apply(wc: &FsWorkingCopy, patches: &[FilePatch], binaries: &[BinaryPatch]) -> ApplyReport {
        WorkingCopyApplier::new(wc.clone())
            .apply(
                ApplyRequest {
                    patches,
                    binaries,
                    context: &PatchContext::new(),
                    destination: None,
                },
                &NoProgress,
                &CancellationToken::new(),
            )
            .unwrap()
    }

    #[test]
    fn rollback_restores_before_side() {
        let (_dir, wc) = setup();
        wc.write("a.txt", b"after").unwrap();
        wc.write("new.txt", b"created").unwrap();

        wc.rollback(&[
            Change::modified(Revision::text("a.txt", "before"), Revision::text("a.txt", "after")),
            Change::added(Revision::text("new.txt", "created")),
            Change::deleted(Revision::text("gone.txt", "was here")),
        ])
        .unwrap();

        assert_eq!(wc.read_text("a.txt").unwrap().as_deref(), Some("before"));
        assert_eq!(wc.read("new.txt").unwrap(), None);
        assert_eq!(wc.read_text("gone.txt").unwrap().as_deref(), Some("was here"));
    }

    #[test]
    fn applies_clean_patch_and_reports_conflict() {
        let (_dir, wc) = setup();
        wc.write("ok.txt", b"one\n").unwrap();
        wc.write("bad.txt", b"drifted\n").unwrap();
        let builder = ContextDiffBuilder::default();
        let patches = vec![
            builder.diff(Some("ok.txt"), "one\n", Some("ok.txt"), "two\n"),
            builder.diff(Some("bad.txt"), "original\n", Some("bad.txt"), "changed\n"),
        ];

        let report = apply(&wc, &patches, &[]);

        assert_eq!(report.applied, vec!["ok.txt".to_string()]);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].path, "bad.txt");
        assert_eq!(wc.read_text("ok.txt").unwrap().as_deref(), Some("two\n"));
        assert_eq!(wc.read_text("bad.txt").unwrap().as_deref(), Some("drifted\n"));
    }

    #[test]
    fn added_file_conflicts_when_present() {
        let (_dir, wc) = setup();
        wc.write("n.txt", b"exists\n").unwrap();
        let patch = ContextDiffBuilder::default().diff(None, "", Some("n.txt"), "new\n");
        let report = apply(&wc, &[patch], &[]);
        assert!(!report.is_clean());
    }

    #[test]
    fn binary_payload_is_copied_and_deletions_remove() {
        let (dir, wc) = setup();
        let payload = dir.path().join("payload.bin");
        fs::write(&payload, [0u8, 1, 2]).unwrap();
        wc.write("old.bin", &[9]).unwrap();

        let report = apply(
            &wc,
            &[],
            &[
                BinaryPatch {
                    before_path: None,
                    after_path: Some("img/c.png".into()),
                    payload: Some(payload),
                },
                BinaryPatch {
                    before_path: Some("old.bin".into()),
                    after_path: None,
                    payload: None,
                },
            ],
        );

        assert!(report.was_applied("img/c.png"));
        assert_eq!(wc.read("img/c.png").unwrap(), Some(vec![0u8, 1, 2]));
        assert_eq!(wc.read("old.bin").unwrap(), None);
    }

    #[test]
    fn cancelled_apply_stops_before_first_file() {
        let (_dir, wc) = setup();
        let patch = ContextDiffBuilder::default().diff(None, "", Some("n.txt"), "new\n");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = WorkingCopyApplier::new(wc.clone())
            .apply(
                ApplyRequest {
                    patches: &[patch],
                    binaries: &[],
                    context: &PatchContext::new(),
                    destination: None,
                },
                &NoProgress,
                &cancel,
            )
            .unwrap();
        assert!(report.cancelled);
        assert!(report.applied.is_empty());
        assert_eq!(wc.read("n.txt").unwrap(), None);
    }

    #[test]
    fn paths_outside_the_root_are_refused() {
        let (dir, wc) = setup();
        let outside = dir.path().parent().unwrap().join("escaped.txt");

        assert!(matches!(wc.write("../escaped.txt", b"x"), Err(ShelfError::UnsafePath(_))));
        assert!(matches!(
            wc.write(outside.to_str().unwrap(), b"x"),
            Err(ShelfError::UnsafePath(_))
        ));
        assert!(matches!(wc.read("a/../../b"), Err(ShelfError::UnsafePath(_))));
        assert!(!outside.exists());
        assert!(check_relative("src/./lib.rs").is_ok());
    }

    #[test]
    fn unsafe_path_stops_the_run_and_keeps_earlier_results() {
        let (_dir, wc) = setup();
        let builder = ContextDiffBuilder::default();
        let patches = vec![
            builder.diff(None, "", Some("first.txt"), "1\n"),
            builder.diff(None, "", Some("../evil.txt"), "x\n"),
            builder.diff(None, "", Some("last.txt"), "3\n"),
        ];

        let report = apply(&wc, &patches, &[]);

        assert_eq!(report.applied, vec!["first.txt".to_string()]);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].path, "../evil.txt");
        assert!(!report.cancelled);
        assert_eq!(wc.read("last.txt").unwrap(), None);
    }

    /// Cancels the token while the `files`-th file is being applied.
    struct CancelAfter {
        files: usize,
        token: CancellationToken,
    }

    impl Progress for CancelAfter {
        fn report(&self, done: usize, _total: usize, _item: &str) {
            if done + 1 >= self.files {
                self.token.cancel();
            }
        }
    }

    #[test]
    fn cancellation_mid_run_reports_what_was_applied() {
        let (_dir, wc) = setup();
        let builder = ContextDiffBuilder::default();
        let patches = vec![
            builder.diff(None, "", Some("a.txt"), "a\n"),
            builder.diff(None, "", Some("b.txt"), "b\n"),
        ];
        let cancel = CancellationToken::new();
        let progress = CancelAfter {
            files: 1,
            token: cancel.clone(),
        };

        let report = WorkingCopyApplier::new(wc.clone())
            .apply(
                ApplyRequest {
                    patches: &patches,
                    binaries: &[],
                    context: &PatchContext::new(),
                    destination: None,
                },
                &progress,
                &cancel,
            )
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.applied, vec!["a.txt".to_string()]);
        assert_eq!(wc.read("b.txt").unwrap(), None);
    }
}
