use parking_lot::RwLockUpgradableReadGuard;

use crate::commands::{Collaborators, StoreLock};
use crate::error::{Result, ShelfError};
use crate::model::{ChangeRecord, EntryFilter, ShelfEntry};
use crate::patch::apply::{reconstruct, TextContents};
use crate::store::fs::read_patch;
use crate::store::ShelfStore;

/// Entries matching `filter`, newest first.
pub fn run(store: &ShelfStore, filter: EntryFilter) -> Vec<ShelfEntry> {
    let mut entries = store.list(filter);
    entries.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.name.cmp(&b.name)));
    entries
}

/// An entry's text change records. A stale cache is refreshed from the patch
/// file, upgrading to the write lock only when that is needed.
pub fn changes(store: &StoreLock, collab: &Collaborators, name: &str) -> Result<Vec<ChangeRecord>> {
    let guard = store.upgradable_read();
    let entry = guard.get(name)?;
    if entry.is_fresh() {
        if let Some(records) = entry.cached_changes() {
            return Ok(records.to_vec());
        }
    }
    let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
    let records = guard
        .get_mut(name)?
        .load_changes(collab.codec.as_ref())?
        .to_vec();
    Ok(records)
}

/// Old and new text of one shelved file.
///
/// The stored hunks are applied to the base revision kept in the patch file,
/// or to the current working-copy text when there is none.
pub fn content(
    store: &StoreLock,
    collab: &Collaborators,
    name: &str,
    key_path: &str,
) -> Result<TextContents> {
    let parsed = {
        let guard = store.read();
        read_patch(&guard.get(name)?.patch_path(), collab.codec.as_ref())?
    };
    let patch = parsed
        .patches
        .iter()
        .find(|p| p.key_path() == key_path)
        .ok_or_else(|| ShelfError::EntryNotFound(format!("{name}/{key_path}")))?;

    let current = match &patch.before_path {
        Some(path) => collab.working_copy.read_text(path)?,
        None => None,
    };
    reconstruct(
        patch,
        current.as_deref(),
        parsed.context.base_revision(key_path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Change;
    use crate::commands::recycle;
    use crate::lifecycle::Initiator;
    use crate::model::ChangesCache;
    use crate::patch::FileStatus;
    use crate::test_utils::TestEnv;
    use chrono::Duration;
    use std::fs;
    use std::time::{Duration as StdDuration, SystemTime};

    #[test]
    fn lists_newest_first_per_filter() {
        let env = TestEnv::new();
        let first = env.shelve("first", vec![env.modified("a.txt", "1\n", "2\n")]).name;
        env.clock.advance(Duration::minutes(1));
        let second = env.shelve("second", vec![env.modified("b.txt", "1\n", "2\n")]).name;
        env.clock.advance(Duration::minutes(1));
        let third = env.shelve("third", vec![env.modified("c.txt", "1\n", "2\n")]).name;
        recycle::run(&mut env.store.write(), &third, Initiator::User, env.clock_now()).unwrap();

        let store = env.store.read();
        let names = |filter| run(&store, filter).into_iter().map(|e| e.name).collect::<Vec<_>>();
        assert_eq!(names(EntryFilter::Active), vec![second.clone(), first.clone()]);
        assert_eq!(names(EntryFilter::Recycled), vec![third.clone()]);
        assert_eq!(names(EntryFilter::All), vec![third, second, first]);
        assert!(names(EntryFilter::Deleted).is_empty());
    }

    #[test]
    fn changes_reload_after_external_edit() {
        let env = TestEnv::new();
        let entry = env.shelve("edit", vec![env.modified("a.txt", "1\n", "2\n")]);
        assert_eq!(changes(&env.store, &env.collab, &entry.name).unwrap().len(), 1);

        let text = "--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-1\n+2\n--- /dev/null\n+++ b/n.txt\n@@ -0,0 +1 @@\n+n\n";
        fs::write(entry.patch_path(), text).unwrap();
        fs::File::options()
            .write(true)
            .open(entry.patch_path())
            .unwrap()
            .set_modified(SystemTime::now() + StdDuration::from_secs(5))
            .unwrap();

        let records = changes(&env.store, &env.collab, &entry.name).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].status, FileStatus::Added);
        assert!(matches!(env.entry(&entry.name).unwrap().cache(), ChangesCache::Loaded { .. }));
    }

    #[test]
    fn content_reconstructs_from_working_copy() {
        let env = TestEnv::new();
        let entry = env.shelve("show", vec![env.modified("a.txt", "x\ny\n", "x\nY\n")]);
        env.write("a.txt", "x\ny\n");

        let contents = content(&env.store, &env.collab, &entry.name, "a.txt").unwrap();
        assert_eq!(contents.before.as_deref(), Some("x\ny\n"));
        assert_eq!(contents.after.as_deref(), Some("x\nY\n"));
    }

    #[test]
    fn content_prefers_base_revision() {
        let env = TestEnv::with_config(|c| c.preload_base_revisions = true);
        let entry = env.shelve("base", vec![env.modified("a.txt", "x\ny\n", "x\nY\n")]);
        env.write("a.txt", "totally different\n");

        let contents = content(&env.store, &env.collab, &entry.name, "a.txt").unwrap();
        assert_eq!(contents.after.as_deref(), Some("x\nY\n"));
    }

    #[test]
    fn content_conflicts_when_hunks_no_longer_match() {
        let env = TestEnv::new();
        let entry = env.shelve("drift", vec![env.modified("a.txt", "x\ny\n", "x\nY\n")]);
        env.write("a.txt", "nothing alike\n");

        let err = content(&env.store, &env.collab, &entry.name, "a.txt").unwrap_err();
        assert!(matches!(err, ShelfError::Conflict { .. }));
    }

    #[test]
    fn added_file_content_has_no_before() {
        let env = TestEnv::new();
        let entry = env.shelve("add", vec![Change::added(crate::change::Revision::text("n.txt", "hello\n"))]);
        let contents = content(&env.store, &env.collab, &entry.name, "n.txt").unwrap();
        assert_eq!(contents.before, None);
        assert_eq!(contents.after.as_deref(), Some("hello\n"));
    }
}
