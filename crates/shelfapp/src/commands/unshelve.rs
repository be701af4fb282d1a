use std::collections::BTreeSet;

use tracing::info;

use crate::commands::split::{self, SplitResult, SplitTarget};
use crate::commands::{transition, Collaborators, Selection, StoreLock};
use crate::error::Result;
use crate::lifecycle::{Initiator, LifecycleState, Transition};
use crate::patch::FilePatch;
use crate::progress::{CancellationToken, Progress};
use crate::store::fs::read_patch;
use crate::working_copy::{ApplyReport, ApplyRequest, BinaryPatch};

#[derive(Debug, Clone)]
pub struct UnshelveRequest {
    pub name: String,
    /// Records to apply; everything when `None`.
    pub selection: Option<Selection>,
    /// Changelist the applied files should land in.
    pub destination: Option<String>,
    /// Take the applied records out of the entry.
    pub remove_from_shelf: bool,
    pub initiator: Initiator,
}

impl UnshelveRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selection: None,
            destination: None,
            remove_from_shelf: false,
            initiator: Initiator::User,
        }
    }

    pub fn removing(mut self) -> Self {
        self.remove_from_shelf = true;
        self
    }

    pub fn selecting(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }
}

#[derive(Debug, Clone)]
pub struct UnshelveOutcome {
    pub report: ApplyReport,
    /// Key paths taken out of the entry.
    pub consumed: Vec<String>,
    /// State of the entry afterwards, when it changed.
    pub state: Option<LifecycleState>,
    /// Entry created to hold the consumed records after a partial unshelve.
    pub split_off: Option<String>,
}

pub fn run(
    store: &StoreLock,
    collab: &Collaborators,
    request: &UnshelveRequest,
    progress: &dyn Progress,
    cancel: &CancellationToken,
) -> Result<UnshelveOutcome> {
    let selected = |key: &str| {
        request
            .selection
            .as_ref()
            .map_or(true, |s| s.contains(key))
    };

    let (parsed, binaries) = {
        let guard = store.read();
        let entry = guard.get(&request.name)?;
        let parsed = read_patch(&entry.patch_path(), collab.codec.as_ref())?;
        let binaries: Vec<BinaryPatch> = entry
            .binaries
            .iter()
            .filter(|b| selected(b.key_path()))
            .map(|b| BinaryPatch {
                before_path: b.before_path.clone(),
                after_path: b.after_path.clone(),
                payload: entry.payload_path(b),
            })
            .collect();
        (parsed, binaries)
    };
    let patches: Vec<FilePatch> = parsed
        .patches
        .iter()
        .filter(|p| selected(p.key_path()))
        .cloned()
        .collect();

    let report = collab.applier.apply(
        ApplyRequest {
            patches: &patches,
            binaries: &binaries,
            context: &parsed.context,
            destination: request.destination.as_deref(),
        },
        progress,
        cancel,
    )?;

    let mut outcome = UnshelveOutcome {
        report,
        consumed: Vec::new(),
        state: None,
        split_off: None,
    };
    if !request.remove_from_shelf {
        return Ok(outcome);
    }

    let consumed: BTreeSet<&str> = patches
        .iter()
        .map(FilePatch::key_path)
        .chain(binaries.iter().map(BinaryPatch::key_path))
        .filter(|key| outcome.report.was_applied(key))
        .collect();
    if consumed.is_empty() {
        return Ok(outcome);
    }
    let consumed_selection = Selection::of(consumed.iter().copied());
    outcome.consumed = consumed.into_iter().map(str::to_string).collect();

    let mut guard = store.write();
    let lifecycle = guard.get(&request.name)?.lifecycle;
    let now = collab.clock.now();
    let split_lifecycle = if lifecycle.is_deleted() {
        lifecycle
    } else {
        lifecycle.apply(Transition::Recycle(request.initiator))?
    };

    match split::run(
        &mut guard,
        collab,
        &request.name,
        &consumed_selection,
        SplitTarget::NewEntry(split_lifecycle),
    )? {
        SplitResult::Emptied => {
            if lifecycle.is_deleted() {
                guard.remove(&request.name)?;
                outcome.state = Some(LifecycleState::Purged);
            } else {
                let mut entry = guard.get(&request.name)?.clone();
                transition(&mut entry, Transition::Recycle(request.initiator), now)?;
                outcome.state = Some(entry.lifecycle.state());
                guard.update(entry)?;
            }
        }
        SplitResult::Split(name) => outcome.split_off = name,
        SplitResult::Nothing => {}
    }

    info!(
        entry = %request.name,
        applied = outcome.report.applied.len(),
        conflicts = outcome.report.conflicts.len(),
        consumed = outcome.consumed.len(),
        "unshelved changes"
    );
    Ok(outcome)
}
