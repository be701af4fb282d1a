use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;
use crate::lifecycle::{LifecycleState, Transition};
use crate::store::ShelfStore;

/// Brings a Deleted entry back, to Recycled if it was recycled before it was
/// deleted and to Active otherwise. The entry takes `date`.
pub fn run(store: &mut ShelfStore, name: &str, date: DateTime<Utc>) -> Result<LifecycleState> {
    let mut entry = store.get(name)?.clone();
    entry.lifecycle = entry.lifecycle.apply(Transition::Restore)?;
    entry.date = date;
    let state = entry.lifecycle.state();
    store.update(entry)?;
    debug!(entry = name, %state, "restored shelf");
    Ok(state)
}
