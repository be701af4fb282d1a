//! Moving part of an entry somewhere else.
//!
//! Unshelving with "remove from shelf" and deleting individual changes both
//! take some records out of an entry. The taken records either become a new
//! entry or are dropped, and the original keeps the rest. An entry is never
//! left behind with zero records: when everything would be taken, nothing is
//! touched and the caller transitions the whole entry instead.
//!
//! [`merge_back`] is the inverse: it folds a split-off entry into the entry
//! it came from.
//!
//! The receiving entry is always written before the giving one is rewritten
//! or removed, so a crash in between duplicates records rather than losing
//! them.

use std::fs;

use tracing::debug;

use crate::commands::{Collaborators, Selection};
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::model::{BinaryRecord, ShelfEntry};
use crate::patch::FilePatch;
use crate::store::directory::ShelfDirectory;
use crate::store::fs::{read_patch, write_patch};
use crate::store::ShelfStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitTarget {
    /// Taken records go to a new entry with this lifecycle.
    NewEntry(Lifecycle),
    /// Taken records are dropped.
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitResult {
    /// The selection matched nothing in the entry.
    Nothing,
    /// The selection covers the whole entry; nothing was changed.
    Emptied,
    /// The entry was split. Holds the new entry's name unless discarded.
    Split(Option<String>),
}

pub fn run(
    store: &mut ShelfStore,
    collab: &Collaborators,
    name: &str,
    selection: &Selection,
    target: SplitTarget,
) -> Result<SplitResult> {
    let mut original = store.get(name)?.clone();
    let parsed = read_patch(&original.patch_path(), collab.codec.as_ref())?;

    let (taken, kept): (Vec<FilePatch>, Vec<FilePatch>) = parsed
        .patches
        .into_iter()
        .partition(|p| selection.contains(p.key_path()));
    let (taken_bin, kept_bin): (Vec<BinaryRecord>, Vec<BinaryRecord>) = original
        .binaries
        .iter()
        .cloned()
        .partition(|b| selection.contains(b.key_path()));

    if taken.is_empty() && taken_bin.is_empty() {
        return Ok(SplitResult::Nothing);
    }
    if kept.is_empty() && kept_bin.is_empty() {
        return Ok(SplitResult::Emptied);
    }

    let split_off = match target {
        SplitTarget::NewEntry(lifecycle) => {
            let dir = ShelfDirectory::allocate(
                store.root(),
                &original.description,
                collab.config.max_name_length,
                |n| store.is_taken(n),
            )?;
            let mut binaries = Vec::with_capacity(taken_bin.len());
            for record in &taken_bin {
                let payload = match original.payload_path(record) {
                    Some(source) => Some(dir.copy_payload(record.key_path(), &source)?),
                    None => None,
                };
                binaries.push(BinaryRecord {
                    payload,
                    ..record.clone()
                });
            }
            let (new_name, path) = dir.into_parts();
            let mut entry = ShelfEntry::new(
                &new_name,
                path,
                &original.description,
                collab.clock.now(),
            );
            entry.lifecycle = lifecycle;
            entry.binaries = binaries;
            write_patch(
                &entry.patch_path(),
                collab.codec.as_ref(),
                &taken,
                &parsed.context.restricted_to(&taken),
            )?;
            entry.set_changes(&taken);
            store.add(entry)?;
            Some(new_name)
        }
        SplitTarget::Discard => None,
    };

    write_patch(
        &original.patch_path(),
        collab.codec.as_ref(),
        &kept,
        &parsed.context.restricted_to(&kept),
    )?;
    for record in &taken_bin {
        if let Some(payload) = original.payload_path(record) {
            if payload.exists() {
                fs::remove_file(payload)?;
            }
        }
    }
    original.binaries = kept_bin;
    original.set_changes(&kept);
    store.update(original)?;

    debug!(
        entry = name,
        taken = taken.len() + taken_bin.len(),
        split_off = split_off.as_deref().unwrap_or("-"),
        "split shelf"
    );
    Ok(SplitResult::Split(split_off))
}

/// Moves every record of `from` into `into` and removes `from`.
pub fn merge_back(
    store: &mut ShelfStore,
    collab: &Collaborators,
    from: &str,
    into: &str,
) -> Result<()> {
    let source = store.get(from)?.clone();
    let mut target = store.get(into)?.clone();
    let incoming = read_patch(&source.patch_path(), collab.codec.as_ref())?;
    let mut merged = read_patch(&target.patch_path(), collab.codec.as_ref())?;

    merged.patches.extend(incoming.patches);
    merged.context.merge(incoming.context);
    let dir = ShelfDirectory::existing(target.dir());
    for record in &source.binaries {
        let payload = match source.payload_path(record) {
            Some(path) => Some(dir.copy_payload(record.key_path(), &path)?),
            None => None,
        };
        target.binaries.push(BinaryRecord {
            payload,
            ..record.clone()
        });
    }
    write_patch(
        &target.patch_path(),
        collab.codec.as_ref(),
        &merged.patches,
        &merged.context,
    )?;
    target.set_changes(&merged.patches);
    store.update(target)?;
    store.remove(from)?;

    debug!(from, into, "merged shelf back");
    Ok(())
}
