use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::Result;
use crate::lifecycle::Transition;
use crate::model::{EntryFilter, ShelfEntry};
use crate::store::ShelfStore;

/// Deletes an entry completely: its record and its directory.
pub fn run(store: &mut ShelfStore, name: &str) -> Result<()> {
    store.get(name)?.lifecycle.apply(Transition::Purge)?;
    store.remove(name)?;
    info!(entry = name, "purged shelf");
    Ok(())
}

/// Deleted entries whose retention window has passed at `now`.
///
/// Use this to show what the janitor would remove before calling [`expired`].
pub fn preview_expired(store: &ShelfStore, now: DateTime<Utc>, retention: Duration) -> Vec<ShelfEntry> {
    let cutoff = now - retention;
    let mut entries: Vec<ShelfEntry> = store
        .list(EntryFilter::Deleted)
        .into_iter()
        .filter(|e| e.date < cutoff)
        .collect();
    entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));
    entries
}

/// Purges every expired Deleted entry; returns their names.
pub fn expired(store: &mut ShelfStore, now: DateTime<Utc>, retention: Duration) -> Result<Vec<String>> {
    let names: Vec<String> = preview_expired(store, now, retention)
        .into_iter()
        .map(|e| e.name)
        .collect();
    for name in &names {
        store.remove(name)?;
    }
    if !names.is_empty() {
        info!(count = names.len(), "purged expired shelves");
    }
    Ok(names)
}
