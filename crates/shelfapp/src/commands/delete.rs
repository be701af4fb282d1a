use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::commands::split::{self, SplitResult, SplitTarget};
use crate::commands::{transition, Collaborators, Selection};
use crate::error::Result;
use crate::lifecycle::Transition;
use crate::store::ShelfStore;

#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    /// Entries deleted as a whole.
    pub entries: Vec<String>,
    /// Individual changes to delete, per entry.
    pub changes: Vec<(String, Selection)>,
}

/// Remembers what a delete did so it can be reverted: every entry that went
/// to Deleted with the date it had before, and for entries split off by a
/// partial delete, the entry they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoToken {
    deleted: BTreeMap<String, DateTime<Utc>>,
    split_from: BTreeMap<String, String>,
}

impl UndoToken {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.deleted.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    pub undo: UndoToken,
    /// Entries that were already Deleted and are now gone.
    pub purged: Vec<String>,
}

pub fn run(
    store: &mut ShelfStore,
    collab: &Collaborators,
    request: &DeleteRequest,
) -> Result<DeleteOutcome> {
    let now = collab.clock.now();
    let mut outcome = DeleteOutcome::default();
    let whole: BTreeSet<&str> = request.entries.iter().map(String::as_str).collect();
    let selected = request.changes.iter().map(|(name, _)| name.as_str());
    validate(store, whole.iter().copied().chain(selected))?;
    let mut cascaded = BTreeSet::new();

    for (name, selection) in &request.changes {
        if whole.contains(name.as_str()) {
            continue;
        }
        let entry = store.get(name)?;
        let original_date = entry.date;
        let target = if entry.lifecycle.is_deleted() {
            SplitTarget::Discard
        } else {
            SplitTarget::NewEntry(entry.lifecycle.apply(Transition::Delete)?)
        };
        match split::run(store, collab, name, selection, target)? {
            SplitResult::Split(Some(new_name)) => {
                outcome.undo.split_from.insert(new_name.clone(), name.clone());
                outcome.undo.deleted.insert(new_name, original_date);
            }
            SplitResult::Emptied => {
                cascaded.insert(name.as_str());
            }
            SplitResult::Split(None) | SplitResult::Nothing => {}
        }
    }

    for name in whole.into_iter().chain(cascaded) {
        let mut entry = store.get(name)?.clone();
        if entry.lifecycle.is_deleted() {
            store.remove(name)?;
            debug!(entry = name, "purged already deleted shelf");
            outcome.purged.push(name.to_string());
            continue;
        }
        let original_date = entry.date;
        transition(&mut entry, Transition::Delete, now)?;
        store.update(entry)?;
        outcome.undo.deleted.insert(name.to_string(), original_date);
    }

    info!(
        deleted = outcome.undo.deleted.len(),
        purged = outcome.purged.len(),
        "deleted shelves"
    );
    Ok(outcome)
}

/// Checks every named entry exists and can be deleted, so a bad name fails
/// the request before anything is written.
fn validate<'a>(store: &ShelfStore, names: impl Iterator<Item = &'a str>) -> Result<()> {
    for name in names {
        let entry = store.get(name)?;
        if !entry.lifecycle.is_deleted() {
            entry.lifecycle.apply(Transition::Delete)?;
        }
    }
    Ok(())
}

/// Reverts a delete. Changes deleted out of an entry are merged back into
/// it when it is still live; entries purged in the meantime are skipped.
/// Returns the names that were restored or merged back.
pub fn undo(
    store: &mut ShelfStore,
    collab: &Collaborators,
    token: &UndoToken,
) -> Result<Vec<String>> {
    let mut restored = Vec::new();
    for (name, date) in &token.deleted {
        let Some(mut entry) = store.find_by_name(name).cloned() else {
            debug!(entry = %name, "cannot undo delete, shelf is gone");
            continue;
        };
        if !entry.lifecycle.is_deleted() {
            continue;
        }
        let live_origin = token.split_from.get(name).filter(|origin| {
            store
                .find_by_name(origin)
                .is_some_and(|o| !o.lifecycle.is_deleted())
        });
        if let Some(origin) = live_origin {
            split::merge_back(store, collab, name, origin)?;
            restored.push(name.clone());
            continue;
        }
        entry.lifecycle = entry.lifecycle.apply(Transition::Restore)?;
        entry.date = *date;
        store.update(entry)?;
        restored.push(name.clone());
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::purge;
    use crate::error::ShelfError;
    use crate::lifecycle::Initiator;
    use crate::model::EntryFilter;
    use crate::test_utils::TestEnv;
    use chrono::Duration;

    fn entry_with_two_files(env: &TestEnv, description: &str) -> String {
        env.shelve(
            description,
            vec![
                env.modified("a.txt", "a\n", "A\n"),
                env.modified("b.txt", "b\n", "B\n"),
            ],
        )
        .name
    }

    fn delete(env: &TestEnv, request: DeleteRequest) -> DeleteOutcome {
        run(&mut env.store.write(), &env.collab, &request).unwrap()
    }

    #[test]
    fn deletes_whole_entries_and_restamps_date() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "one");
        let created = env.entry(&name).unwrap().date;
        env.clock.advance(Duration::hours(3));

        let outcome = delete(
            &env,
            DeleteRequest {
                entries: vec![name.clone()],
                ..Default::default()
            },
        );

        let entry = env.entry(&name).unwrap();
        assert!(entry.lifecycle.is_deleted());
        assert_eq!(entry.date, env.clock_now());
        assert_eq!(outcome.undo.names().collect::<Vec<_>>(), vec![name.as_str()]);
        assert_ne!(entry.date, created);
    }

    #[test]
    fn deleting_twice_purges() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "twice");
        let request = DeleteRequest {
            entries: vec![name.clone()],
            ..Default::default()
        };
        delete(&env, request.clone());
        let outcome = delete(&env, request);

        assert_eq!(outcome.purged, vec![name.clone()]);
        assert!(outcome.undo.is_empty());
        assert!(env.entry(&name).is_none());
        assert!(!env.store_root().join(&name).exists());
    }

    #[test]
    fn deleting_some_changes_splits_them_into_deleted_entry() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "part");

        let outcome = delete(
            &env,
            DeleteRequest {
                changes: vec![(name.clone(), Selection::of(["b.txt"]))],
                ..Default::default()
            },
        );

        let original = env.entry(&name).unwrap();
        assert!(original.lifecycle.is_active());
        assert_eq!(original.total_records(), Some(1));
        let split_name = outcome.undo.names().next().unwrap().to_string();
        let split = env.entry(&split_name).unwrap();
        assert!(split.lifecycle.is_deleted());
        assert_eq!(split.cached_changes().unwrap()[0].key_path(), "b.txt");
    }

    #[test]
    fn selecting_every_change_deletes_the_entry() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "all");

        let outcome = delete(
            &env,
            DeleteRequest {
                changes: vec![(name.clone(), Selection::of(["a.txt", "b.txt"]))],
                ..Default::default()
            },
        );

        assert_eq!(env.store.read().len(), 1);
        assert!(env.entry(&name).unwrap().lifecycle.is_deleted());
        assert_eq!(outcome.undo.names().collect::<Vec<_>>(), vec![name.as_str()]);
    }

    #[test]
    fn deleting_changes_of_a_deleted_entry_drops_them() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "gone");
        delete(
            &env,
            DeleteRequest {
                entries: vec![name.clone()],
                ..Default::default()
            },
        );

        let outcome = delete(
            &env,
            DeleteRequest {
                changes: vec![(name.clone(), Selection::of(["a.txt"]))],
                ..Default::default()
            },
        );

        assert!(outcome.undo.is_empty());
        assert_eq!(env.store.read().len(), 1);
        assert_eq!(env.entry(&name).unwrap().total_records(), Some(1));
    }

    #[test]
    fn unknown_name_fails_the_whole_batch() {
        let env = TestEnv::new();
        let kept = entry_with_two_files(&env, "kept");
        let split = entry_with_two_files(&env, "split");

        let result = run(
            &mut env.store.write(),
            &env.collab,
            &DeleteRequest {
                entries: vec![kept.clone(), "zzz_missing".into()],
                changes: vec![(split.clone(), Selection::of(["a.txt"]))],
            },
        );

        assert!(matches!(result, Err(ShelfError::EntryNotFound(_))));
        assert!(env.entry(&kept).unwrap().lifecycle.is_active());
        assert_eq!(env.entry(&split).unwrap().total_records(), Some(2));
        assert_eq!(env.store.read().len(), 2);
        assert!(env.store.read().list(EntryFilter::Deleted).is_empty());
    }

    #[test]
    fn repeated_whole_selection_deletes_once() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "twice");
        let everything = Selection::of(["a.txt", "b.txt"]);

        let outcome = delete(
            &env,
            DeleteRequest {
                changes: vec![(name.clone(), everything.clone()), (name.clone(), everything)],
                ..Default::default()
            },
        );

        assert!(outcome.purged.is_empty());
        assert!(env.entry(&name).unwrap().lifecycle.is_deleted());
        assert_eq!(outcome.undo.names().collect::<Vec<_>>(), vec![name.as_str()]);
    }

    #[test]
    fn undo_restores_state_and_date() {
        let env = TestEnv::new();
        let active = entry_with_two_files(&env, "active");
        let recycled = entry_with_two_files(&env, "recycled");
        {
            let mut guard = env.store.write();
            let mut entry = guard.get(&recycled).unwrap().clone();
            transition(&mut entry, Transition::Recycle(Initiator::User), env.clock_now()).unwrap();
            guard.update(entry).unwrap();
        }
        let before = env.entry(&active).unwrap().date;
        env.clock.advance(Duration::days(1));

        let outcome = delete(
            &env,
            DeleteRequest {
                entries: vec![active.clone(), recycled.clone()],
                ..Default::default()
            },
        );
        let restored = undo(&mut env.store.write(), &env.collab, &outcome.undo).unwrap();

        assert_eq!(restored.len(), 2);
        let active = env.entry(&active).unwrap();
        assert!(active.lifecycle.is_active());
        assert_eq!(active.date, before);
        assert!(env.entry(&recycled).unwrap().lifecycle.is_recycled());
        assert!(env.store.read().list(EntryFilter::Deleted).is_empty());
    }

    #[test]
    fn undo_merges_deleted_changes_back() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "merge");
        let before = run_list(&env);

        let outcome = delete(
            &env,
            DeleteRequest {
                changes: vec![(name.clone(), Selection::of(["a.txt"]))],
                ..Default::default()
            },
        );
        assert_eq!(env.store.read().len(), 2);
        undo(&mut env.store.write(), &env.collab, &outcome.undo).unwrap();

        assert_eq!(run_list(&env), before);
    }

    fn run_list(env: &TestEnv) -> Vec<(String, DateTime<Utc>, usize)> {
        crate::commands::list::run(&env.store.read(), EntryFilter::All)
            .into_iter()
            .map(|e| {
                let records = e.total_records().unwrap_or_default();
                (e.name, e.date, records)
            })
            .collect()
    }

    #[test]
    fn undo_skips_purged_entries() {
        let env = TestEnv::new();
        let name = entry_with_two_files(&env, "short");
        let outcome = delete(
            &env,
            DeleteRequest {
                entries: vec![name.clone()],
                ..Default::default()
            },
        );
        purge::run(&mut env.store.write(), &name).unwrap();

        let restored = undo(&mut env.store.write(), &env.collab, &outcome.undo).unwrap();
        assert!(restored.is_empty());
    }
}
