//! # Engine Facade
//!
//! [`ShelfEngine`] is the single entry point for shelf operations. It is a
//! **thin facade** over the command layer.
//!
//! ## Role and Responsibilities
//!
//! The engine:
//! - **Owns** the store behind a `parking_lot::RwLock` and the injected collaborators
//! - **Dispatches** to the matching command function
//! - **Broadcasts** "store changed" after every successful mutation
//! - **Supplies time** from its [`Clock`], so tests can run on virtual time
//!
//! ## What the Engine Does NOT Do
//!
//! - **Business logic**: that belongs in `commands/*.rs`
//! - **Presentation**: it returns typed outcomes, never strings for display
//! - **Scheduling**: the periodic purge lives in [`crate::janitor`]
//!
//! ## Sharing
//!
//! The engine is `Send + Sync`. Wrap it in an `Arc` to use it from several
//! threads or to hand it to the janitor.
//!
//! ## Testing Strategy
//!
//! Engine tests check wiring: the right command runs, events fire, rollback
//! happens after the entry is stored. Command logic is tested in the
//! command modules; whole workflows are tested in `tests/`.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::commands::delete::{DeleteOutcome, DeleteRequest, UndoToken};
use crate::commands::import::ImportReport;
use crate::commands::shelve::{ShelveOutcome, ShelveRequest};
use crate::commands::unshelve::{UnshelveOutcome, UnshelveRequest};
use crate::commands::{self, Collaborators, StoreLock};
use crate::config::ShelfConfig;
use crate::error::Result;
use crate::events::{ChangeNotifier, StoreChanged};
use crate::lifecycle::{Initiator, LifecycleState};
use crate::model::{ChangeRecord, EntryFilter, ShelfEntry};
use crate::patch::apply::TextContents;
use crate::patch::builder::ContextDiffBuilder;
use crate::patch::unified::UnifiedDiffCodec;
use crate::patch::{PatchBuilder, PatchCodec};
use crate::progress::{CancellationToken, Progress};
use crate::store::{LoadReport, ShelfStore};
use crate::working_copy::{PatchApplier, WorkingCopy, WorkingCopyApplier};

pub struct ShelfEngine {
    store: StoreLock,
    collab: Collaborators,
    notifier: ChangeNotifier,
}

/// Collects collaborators before opening the store. Anything not set falls
/// back to the filesystem defaults.
pub struct ShelfEngineBuilder {
    root: PathBuf,
    working_copy: Arc<dyn WorkingCopy>,
    config: ShelfConfig,
    codec: Option<Arc<dyn PatchCodec>>,
    builder: Option<Arc<dyn PatchBuilder>>,
    applier: Option<Arc<dyn PatchApplier>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ShelfEngineBuilder {
    pub fn with_config(mut self, config: ShelfConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn PatchCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_builder(mut self, builder: Arc<dyn PatchBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_applier(mut self, applier: Arc<dyn PatchApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Loads the store and returns the engine with what loading found.
    pub fn open(self) -> Result<(ShelfEngine, LoadReport)> {
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(UnifiedDiffCodec::with_default_extensions()));
        let (store, report) = ShelfStore::open(&self.root, codec.as_ref())?;
        let applier = self
            .applier
            .unwrap_or_else(|| Arc::new(WorkingCopyApplier::new(self.working_copy.clone())));

        let collab = Collaborators {
            codec,
            builder: self
                .builder
                .unwrap_or_else(|| Arc::new(ContextDiffBuilder::default())),
            applier,
            working_copy: self.working_copy,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
        };
        Ok((
            ShelfEngine {
                store: RwLock::new(store),
                collab,
                notifier: ChangeNotifier::new(),
            },
            report,
        ))
    }
}

impl ShelfEngine {
    pub fn builder(root: impl Into<PathBuf>, working_copy: Arc<dyn WorkingCopy>) -> ShelfEngineBuilder {
        ShelfEngineBuilder {
            root: root.into(),
            working_copy,
            config: ShelfConfig::default(),
            codec: None,
            builder: None,
            applier: None,
            clock: None,
        }
    }

    /// Persists every entry and releases the store.
    pub fn close(self) -> Result<()> {
        let store = self.store.into_inner();
        info!(root = %store.root().display(), "closing shelf store");
        store.close()
    }

    pub fn persist(&self) -> Result<()> {
        self.store.read().persist_all()
    }

    pub fn root(&self) -> PathBuf {
        self.store.read().root().to_path_buf()
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.collab.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.collab.clock.now()
    }

    pub fn subscribe(&self) -> Receiver<StoreChanged> {
        self.notifier.subscribe()
    }

    fn changed<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_ok() {
            self.notifier.broadcast();
        }
        result
    }

    /// Shelves changes. The working-copy rollback, when requested, runs
    /// after the entry is stored and announced.
    pub fn shelve(
        &self,
        request: &ShelveRequest,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<ShelveOutcome> {
        let mut outcome = self.changed(commands::shelve::run(
            &self.store,
            &self.collab,
            request,
            progress,
            cancel,
        ))?;
        if request.rollback {
            outcome.rollback_error = commands::shelve::rollback(&self.collab, request);
        }
        Ok(outcome)
    }

    pub fn unshelve(
        &self,
        request: &UnshelveRequest,
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<UnshelveOutcome> {
        let outcome =
            commands::unshelve::run(&self.store, &self.collab, request, progress, cancel)?;
        if !outcome.consumed.is_empty() {
            self.notifier.broadcast();
        }
        Ok(outcome)
    }

    pub fn delete_shelves(&self, request: &DeleteRequest) -> Result<DeleteOutcome> {
        self.changed(commands::delete::run(
            &mut self.store.write(),
            &self.collab,
            request,
        ))
    }

    pub fn undo_delete(&self, token: &UndoToken) -> Result<Vec<String>> {
        self.changed(commands::delete::undo(&mut self.store.write(), &self.collab, token))
    }

    pub fn restore(&self, name: &str, date: DateTime<Utc>) -> Result<LifecycleState> {
        self.changed(commands::restore::run(&mut self.store.write(), name, date))
    }

    pub fn rename(&self, name: &str, description: &str) -> Result<()> {
        self.changed(commands::rename::run(
            &mut self.store.write(),
            name,
            description,
        ))
    }

    pub fn recycle(&self, name: &str, initiator: Initiator) -> Result<LifecycleState> {
        self.changed(commands::recycle::run(
            &mut self.store.write(),
            name,
            initiator,
            self.now(),
        ))
    }

    pub fn mark_to_delete(&self, name: &str) -> Result<()> {
        self.changed(commands::recycle::mark_to_delete(
            &mut self.store.write(),
            name,
            self.now(),
        ))
    }

    pub fn reactivate(&self, name: &str) -> Result<()> {
        self.changed(commands::recycle::reactivate(
            &mut self.store.write(),
            name,
            self.now(),
        ))
    }

    pub fn clean_recycled(&self, older_than: DateTime<Utc>) -> Result<Vec<String>> {
        let cleaned =
            commands::recycle::clean_recycled(&mut self.store.write(), older_than, self.now())?;
        if !cleaned.is_empty() {
            self.notifier.broadcast();
        }
        Ok(cleaned)
    }

    /// Deletes an entry completely.
    pub fn purge(&self, name: &str) -> Result<()> {
        self.changed(commands::purge::run(&mut self.store.write(), name))
    }

    /// Deleted entries the next [`purge_expired`](Self::purge_expired) would remove.
    pub fn preview_expired(&self) -> Vec<ShelfEntry> {
        commands::purge::preview_expired(
            &self.store.read(),
            self.now(),
            self.collab.config.retention(),
        )
    }

    pub fn purge_expired(&self) -> Result<Vec<String>> {
        let purged = commands::purge::expired(
            &mut self.store.write(),
            self.now(),
            self.collab.config.retention(),
        )?;
        if !purged.is_empty() {
            self.notifier.broadcast();
        }
        Ok(purged)
    }

    pub fn import_patches(
        &self,
        paths: &[PathBuf],
        progress: &dyn Progress,
        cancel: &CancellationToken,
    ) -> Result<ImportReport> {
        let report = commands::import::run(&self.store, &self.collab, paths, progress, cancel)?;
        if !report.imported.is_empty() {
            self.notifier.broadcast();
        }
        Ok(report)
    }

    pub fn list(&self, filter: EntryFilter) -> Vec<ShelfEntry> {
        commands::list::run(&self.store.read(), filter)
    }

    pub fn find(&self, name: &str) -> Option<ShelfEntry> {
        self.store.read().find_by_name(name).cloned()
    }

    pub fn changes(&self, name: &str) -> Result<Vec<ChangeRecord>> {
        commands::list::changes(&self.store, &self.collab, name)
    }

    pub fn content(&self, name: &str, key_path: &str) -> Result<TextContents> {
        commands::list::content(&self.store, &self.collab, name, key_path)
    }

    /// Directory of an entry, for hosts that want to show or export it.
    pub fn entry_dir(&self, name: &str) -> Option<PathBuf> {
        self.store
            .read()
            .find_by_name(name)
            .map(|e| e.dir().to_path_buf())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.store.read().find_by_name(name).is_some()
    }
}
