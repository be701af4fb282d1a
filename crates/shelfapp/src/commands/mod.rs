//! # Command Layer
//!
//! This module contains the **core business logic** of the shelf engine.
//! Each operation lives in its own submodule as plain functions over the
//! store and the injected collaborators.
//!
//! ## Role and Responsibilities
//!
//! Commands are where the real work happens:
//! - Implement the actual logic for each operation
//! - Operate on [`ShelfEntry`], [`ChangeRecord`](crate::model::ChangeRecord) and patch types
//! - Return typed outcomes (`ShelveOutcome`, `UnshelveOutcome`, ...)
//! - Are completely UI-agnostic
//!
//! ## What Commands Do NOT Do
//!
//! - **Eventing**: the engine broadcasts "store changed" after a command returns
//! - **User interaction**: no prompts, no confirmations
//! - **Global state**: every collaborator arrives through [`Collaborators`]
//!
//! ## Locking
//!
//! Short operations take `&mut ShelfStore` and run under one write lock the
//! engine holds. Long ones ([`shelve`], [`unshelve`], [`import`], and the
//! cache refresh in [`list`]) take the [`StoreLock`] itself and lock in
//! bursts, so readers are not blocked while patches are built or applied.
//!
//! ## Command Modules
//!
//! - [`shelve`]: Turn working-copy changes into a new entry
//! - [`unshelve`]: Apply an entry (or part of it) back
//! - [`split`]: Move part of an entry into a new one
//! - [`delete`]: Soft-delete entries or selected changes, and undo it
//! - [`restore`]: Bring a Deleted entry back
//! - [`recycle`]: Recycle, mark for system recycle, reactivate, bulk clean
//! - [`rename`]: Change an entry's description
//! - [`purge`]: Remove entries for good, including the retention sweep
//! - [`import`]: Create entries from external patch files
//! - [`list`]: Enumerate entries, their changes and file contents

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::config::ShelfConfig;
use crate::error::Result;
use crate::lifecycle::Transition;
use crate::model::ShelfEntry;
use crate::patch::PatchBuilder;
use crate::patch::PatchCodec;
use crate::store::ShelfStore;
use crate::working_copy::{PatchApplier, WorkingCopy};

pub mod delete;
pub mod import;
pub mod list;
pub mod purge;
pub mod recycle;
pub mod rename;
pub mod restore;
pub mod shelve;
pub mod split;
pub mod unshelve;

pub type StoreLock = RwLock<ShelfStore>;

/// Everything a command needs besides the store.
#[derive(Clone)]
pub struct Collaborators {
    pub codec: Arc<dyn PatchCodec>,
    pub builder: Arc<dyn PatchBuilder>,
    pub applier: Arc<dyn PatchApplier>,
    pub working_copy: Arc<dyn WorkingCopy>,
    pub clock: Arc<dyn Clock>,
    pub config: ShelfConfig,
}

/// A set of changes inside one entry, identified by key path (the before
/// path, or the after path for additions). Matches text and binary records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    paths: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    pub fn contains(&self, key_path: &str) -> bool {
        self.paths.contains(key_path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

/// Applies a lifecycle transition. Entering `Deleted` stamps the entry with
/// `now`, which starts its retention window.
pub(crate) fn transition(
    entry: &mut ShelfEntry,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<()> {
    let next = entry.lifecycle.apply(transition)?;
    if next.is_deleted() && !entry.lifecycle.is_deleted() {
        entry.date = now;
    }
    entry.lifecycle = next;
    Ok(())
}
