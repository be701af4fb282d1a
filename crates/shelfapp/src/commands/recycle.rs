use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::commands::transition;
use crate::error::Result;
use crate::lifecycle::{Initiator, LifecycleState, Transition};
use crate::model::EntryFilter;
use crate::store::ShelfStore;

fn apply(
    store: &mut ShelfStore,
    name: &str,
    t: Transition,
    now: DateTime<Utc>,
) -> Result<LifecycleState> {
    let mut entry = store.get(name)?.clone();
    transition(&mut entry, t, now)?;
    let state = entry.lifecycle.state();
    store.update(entry)?;
    debug!(entry = name, transition = %t, %state, "shelf lifecycle changed");
    Ok(state)
}

/// Recycles an entry. A system recycle of an entry marked to delete sends it
/// to Deleted instead.
pub fn run(
    store: &mut ShelfStore,
    name: &str,
    initiator: Initiator,
    now: DateTime<Utc>,
) -> Result<LifecycleState> {
    apply(store, name, Transition::Recycle(initiator), now)
}

/// Flags an Active entry so the next system recycle deletes it.
pub fn mark_to_delete(store: &mut ShelfStore, name: &str, now: DateTime<Utc>) -> Result<()> {
    apply(store, name, Transition::MarkToDelete, now).map(|_| ())
}

/// Moves a Recycled entry back to Active.
pub fn reactivate(store: &mut ShelfStore, name: &str, now: DateTime<Utc>) -> Result<()> {
    apply(store, name, Transition::Reactivate, now).map(|_| ())
}

/// Deletes every Recycled entry dated before `older_than`; returns their names.
pub fn clean_recycled(
    store: &mut ShelfStore,
    older_than: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut names: Vec<String> = store
        .list(EntryFilter::Recycled)
        .into_iter()
        .filter(|e| e.date < older_than)
        .map(|e| e.name)
        .collect();
    names.sort();
    for name in &names {
        apply(store, name, Transition::Delete, now)?;
    }
    if !names.is_empty() {
        info!(count = names.len(), "cleaned recycled shelves");
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShelfError;
    use crate::test_utils::TestEnv;
    use chrono::Duration;

    fn shelved(env: &TestEnv, description: &str) -> String {
        env.shelve(description, vec![env.modified("a.txt", "1\n", "2\n")])
            .name
    }

    #[test]
    fn recycle_and_reactivate() {
        let env = TestEnv::new();
        let name = shelved(&env, "r");
        let now = env.clock_now();

        assert_eq!(
            run(&mut env.store.write(), &name, Initiator::User, now).unwrap(),
            LifecycleState::Recycled
        );
        reactivate(&mut env.store.write(), &name, now).unwrap();
        assert!(env.entry(&name).unwrap().lifecycle.is_active());
    }

    #[test]
    fn marked_entry_is_deleted_by_system_recycle() {
        let env = TestEnv::new();
        let name = shelved(&env, "m");
        let now = env.clock_now();
        mark_to_delete(&mut env.store.write(), &name, now).unwrap();

        let state = run(&mut env.store.write(), &name, Initiator::System, now).unwrap();
        assert_eq!(state, LifecycleState::Deleted);
    }

    #[test]
    fn marked_entry_is_recycled_by_user() {
        let env = TestEnv::new();
        let name = shelved(&env, "m");
        let now = env.clock_now();
        mark_to_delete(&mut env.store.write(), &name, now).unwrap();

        let state = run(&mut env.store.write(), &name, Initiator::User, now).unwrap();
        assert_eq!(state, LifecycleState::Recycled);
    }

    #[test]
    fn recycled_entries_cannot_be_marked() {
        let env = TestEnv::new();
        let name = shelved(&env, "m");
        let now = env.clock_now();
        run(&mut env.store.write(), &name, Initiator::User, now).unwrap();

        let err = mark_to_delete(&mut env.store.write(), &name, now).unwrap_err();
        assert!(matches!(err, ShelfError::InvalidTransition { .. }));
    }

    #[test]
    fn clean_recycled_only_touches_old_entries() {
        let env = TestEnv::new();
        let old = shelved(&env, "old");
        run(&mut env.store.write(), &old, Initiator::User, env.clock_now()).unwrap();
        env.clock.advance(Duration::days(10));
        let fresh = shelved(&env, "fresh");
        run(&mut env.store.write(), &fresh, Initiator::User, env.clock_now()).unwrap();

        let cutoff = env.clock_now() - Duration::days(1);
        let cleaned = clean_recycled(&mut env.store.write(), cutoff, env.clock_now()).unwrap();

        assert_eq!(cleaned, vec![old.clone()]);
        let old = env.entry(&old).unwrap();
        assert!(old.lifecycle.is_deleted());
        assert!(old.lifecycle.was_recycled());
        assert!(env.entry(&fresh).unwrap().lifecycle.is_recycled());
    }
}
