use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::commands::{Collaborators, StoreLock};
use crate::error::{Result, ShelfError};
use crate::model::ShelfEntry;
use crate::progress::{CancellationToken, Progress};
use crate::store::directory::ShelfDirectory;
use crate::store::fs::{read_patch, PATCH_FILE};
use crate::working_copy::check_relative;

/// Extensions picked up when a directory is imported.
pub const PATCH_EXTENSIONS: [&str; 2] = ["patch", "diff"];

#[derive(Debug, Default)]
pub struct ImportReport {
    /// Names of the created entries.
    pub imported: Vec<String>,
    pub failures: Vec<(PathBuf, ShelfError)>,
    pub cancelled: bool,
}

/// Expands directories into the patch files directly inside them.
fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .and_then(|e| e.to_str())
                            .is_some_and(|e| PATCH_EXTENSIONS.contains(&e))
                })
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

pub fn run(
    store: &StoreLock,
    collab: &Collaborators,
    paths: &[PathBuf],
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Result<ImportReport> {
    let files = collect_files(paths)?;
    let mut report = ImportReport::default();

    for (done, file) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        progress.report(done, files.len(), &file.display().to_string());
        match import_file(store, collab, file) {
            Ok(name) => report.imported.push(name),
            Err(err) => {
                warn!(file = %file.display(), error = %err, "patch import failed");
                report.failures.push((file.clone(), err));
            }
        }
    }

    info!(
        imported = report.imported.len(),
        failed = report.failures.len(),
        "imported patches"
    );
    Ok(report)
}

fn import_file(store: &StoreLock, collab: &Collaborators, file: &Path) -> Result<String> {
    let parsed = read_patch(file, collab.codec.as_ref())?;
    if parsed.patches.is_empty() {
        return Err(ShelfError::EmptyImport(file.to_path_buf()));
    }
    for patch in &parsed.patches {
        for path in patch.before_path.iter().chain(&patch.after_path) {
            check_relative(path)?;
        }
    }
    let description = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut guard = store.write();
    let dir = ShelfDirectory::allocate(
        guard.root(),
        &description,
        collab.config.max_name_length,
        |n| guard.is_taken(n),
    )?;
    if let Err(err) = fs::copy(file, dir.path().join(PATCH_FILE)) {
        dir.discard()?;
        return Err(err.into());
    }
    let (name, path) = dir.into_parts();
    let mut entry = ShelfEntry::new(&name, path, description, collab.clock.now());
    entry.set_changes(&parsed.patches);
    guard.add(entry)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::test_utils::TestEnv;
    use tempfile::TempDir;

    const PATCH: &str = "--- a/x.txt\n+++ b/x.txt\n@@ -1 +1 @@\n-old\n+new\n";

    fn import(env: &TestEnv, paths: &[PathBuf]) -> ImportReport {
        run(&env.store, &env.collab, paths, &NoProgress, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn imports_file_verbatim() {
        let env = TestEnv::new();
        let src = TempDir::new().unwrap();
        let file = src.path().join("feature.patch");
        fs::write(&file, PATCH).unwrap();

        let report = import(&env, &[file]);

        assert_eq!(report.imported, vec!["feature.patch".to_string()]);
        let entry = env.entry("feature.patch").unwrap();
        assert_eq!(entry.description, "feature.patch");
        assert_eq!(fs::read_to_string(entry.patch_path()).unwrap(), PATCH);
        assert_eq!(entry.total_records(), Some(1));
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let env = TestEnv::new();
        let src = TempDir::new().unwrap();
        let empty = src.path().join("empty.patch");
        let broken = src.path().join("broken.patch");
        let good = src.path().join("good.patch");
        fs::write(&empty, "just some notes\n").unwrap();
        fs::write(&broken, "@@ -1 +1 @@\n-a\n+b\n").unwrap();
        fs::write(&good, PATCH).unwrap();

        let report = import(&env, &[empty.clone(), broken.clone(), good, src.path().join("missing.patch")]);

        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.failures.len(), 3);
        assert!(matches!(report.failures[0].1, ShelfError::EmptyImport(_)));
        assert!(matches!(report.failures[1].1, ShelfError::CorruptPatch { .. }));
        assert!(matches!(report.failures[2].1, ShelfError::Io(_)));
        assert_eq!(env.store.read().len(), 1);
    }

    #[test]
    fn patches_reaching_outside_the_working_copy_are_refused() {
        let env = TestEnv::new();
        let src = TempDir::new().unwrap();
        let absolute = src.path().join("absolute.patch");
        let climbing = src.path().join("climbing.patch");
        fs::write(
            &absolute,
            "--- /dev/null\n+++ b//tmp/pwned.txt\n@@ -0,0 +1 @@\n+x\n",
        )
        .unwrap();
        fs::write(
            &climbing,
            "--- a/../x.txt\n+++ b/../x.txt\n@@ -1 +1 @@\n-a\n+b\n",
        )
        .unwrap();

        let report = import(&env, &[absolute, climbing]);

        assert!(report.imported.is_empty());
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|(_, err)| matches!(err, ShelfError::UnsafePath(_))));
        assert_eq!(env.store.read().len(), 0);
        let dirs = fs::read_dir(env.store_root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .count();
        assert_eq!(dirs, 0);
    }

    #[test]
    fn directories_contribute_their_patch_files() {
        let env = TestEnv::new();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a.patch"), PATCH).unwrap();
        fs::write(src.path().join("b.diff"), PATCH).unwrap();
        fs::write(src.path().join("notes.txt"), PATCH).unwrap();

        let report = import(&env, &[src.path().to_path_buf()]);
        assert_eq!(report.imported, vec!["a.patch".to_string(), "b.diff".to_string()]);
    }

    #[test]
    fn cancellation_stops_before_next_file() {
        let env = TestEnv::new();
        let src = TempDir::new().unwrap();
        let file = src.path().join("a.patch");
        fs::write(&file, PATCH).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run(&env.store, &env.collab, &[file], &NoProgress, &cancel).unwrap();
        assert!(report.cancelled);
        assert!(report.imported.is_empty());
    }
}
