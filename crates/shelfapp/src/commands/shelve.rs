use tracing::{debug, info, warn};

use crate::change::Change;
use crate::commands::{Collaborators, StoreLock};
use crate::error::{Result, ShelfError};
use crate::lifecycle::Lifecycle;
use crate::model::{BinaryRecord, ShelfEntry};
use crate::patch::{FilePatch, PatchContext};
use crate::progress::{CancellationToken, Progress};
use crate::store::directory::ShelfDirectory;
use crate::store::fs::write_patch;

#[derive(Debug, Clone, Default)]
pub struct ShelveRequest {
    pub changes: Vec<Change>,
    pub description: String,
    /// Revert the shelved changes in the working copy afterwards.
    pub rollback: bool,
    /// Skip changes the user left out of a partial selection.
    pub honor_exclusions: bool,
    /// The entry comes from an automatic flow and is deleted, not recycled,
    /// when the system recycles it.
    pub mark_to_delete: bool,
}

impl ShelveRequest {
    pub fn new(description: impl Into<String>, changes: Vec<Change>) -> Self {
        Self {
            changes,
            description: description.into(),
            ..Default::default()
        }
    }

    /// The changes that end up in the entry.
    pub fn shelvable(&self) -> impl Iterator<Item = &Change> {
        self.changes
            .iter()
            .filter(|c| !c.is_directory() && !(self.honor_exclusions && c.excluded))
    }
}

#[derive(Debug, Clone)]
pub struct ShelveOutcome {
    pub entry: ShelfEntry,
    /// Key paths of changes that were not shelved (directories, exclusions).
    pub skipped: Vec<String>,
    /// Set when the working-copy rollback failed. The entry is kept.
    pub rollback_error: Option<String>,
}

pub fn run(
    store: &StoreLock,
    collab: &Collaborators,
    request: &ShelveRequest,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Result<ShelveOutcome> {
    let skipped: Vec<String> = request
        .changes
        .iter()
        .filter(|c| c.is_directory() || (request.honor_exclusions && c.excluded))
        .filter_map(|c| c.key_path().map(str::to_string))
        .collect();
    let (binaries, texts): (Vec<&Change>, Vec<&Change>) =
        request.shelvable().partition(|c| c.is_binary());

    if binaries.is_empty() && texts.is_empty() {
        warn!(description = %request.description, "shelving an empty change set");
    }

    let (dir, binary_records) = {
        let guard = store.write();
        let dir = ShelfDirectory::allocate(
            guard.root(),
            &request.description,
            collab.config.max_name_length,
            |name| guard.is_taken(name),
        )?;
        let mut records = Vec::with_capacity(binaries.len());
        for change in &binaries {
            records.push(copy_binary(&dir, change)?);
        }
        (dir, records)
    };

    let patch_path = dir.path().join(crate::store::fs::PATCH_FILE);
    let mut patches: Vec<FilePatch> = Vec::new();
    let mut context = PatchContext::new();
    let mut done = 0;

    for batch in texts.chunks(collab.config.batch_size()) {
        if cancel.is_cancelled() {
            debug!(dir = dir.name(), "shelve cancelled, discarding directory");
            dir.discard()?;
            return Err(ShelfError::Cancelled);
        }
        progress.report(
            done,
            texts.len(),
            batch[0].key_path().unwrap_or_default(),
        );

        let owned: Vec<Change> = batch.iter().map(|c| (*c).clone()).collect();
        patches.extend(collab.builder.build(&owned)?);
        if collab.config.preload_base_revisions {
            for change in batch {
                if let Some(before) = &change.before {
                    if let Some(text) = before.content.as_text() {
                        context.set_base_revision(before.path.clone(), text);
                    }
                }
            }
        }

        let _guard = store.write();
        write_patch(&patch_path, collab.codec.as_ref(), &patches, &context)?;
        done += batch.len();
    }

    if texts.is_empty() {
        write_patch(&patch_path, collab.codec.as_ref(), &patches, &context)?;
    }

    let (name, path) = dir.into_parts();
    let mut entry = ShelfEntry::new(name, path, &request.description, collab.clock.now());
    if request.mark_to_delete {
        entry.lifecycle = Lifecycle::marked_for_system_recycle();
    }
    entry.binaries = binary_records;
    entry.set_changes(&patches);

    store.write().add(entry.clone())?;
    info!(
        entry = %entry.name,
        text = patches.len(),
        binary = entry.binaries.len(),
        skipped = skipped.len(),
        "shelved changes"
    );

    Ok(ShelveOutcome {
        entry,
        skipped,
        rollback_error: None,
    })
}

fn copy_binary(dir: &ShelfDirectory, change: &Change) -> Result<BinaryRecord> {
    let payload = match &change.after {
        Some(after) => Some(dir.store_payload(&after.path, after.content.bytes())?),
        None => None,
    };
    Ok(BinaryRecord {
        before_path: change.before.as_ref().map(|r| r.path.clone()),
        after_path: change.after.as_ref().map(|r| r.path.clone()),
        payload,
    })
}

/// Reverts what was shelved. Errors are returned as text for the outcome:
/// a failed rollback never undoes the shelve.
pub fn rollback(collab: &Collaborators, request: &ShelveRequest) -> Option<String> {
    let changes: Vec<Change> = request.shelvable().cloned().collect();
    match collab.working_copy.rollback(&changes) {
        Ok(()) => None,
        Err(err) => {
            warn!(error = %err, "rollback after shelve failed");
            Some(err.to_string())
        }
    }
}
