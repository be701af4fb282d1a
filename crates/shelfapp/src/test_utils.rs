use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use tempfile::TempDir;

use crate::change::{Change, Revision};
use crate::clock::ManualClock;
use crate::commands::shelve::{self, ShelveOutcome, ShelveRequest};
use crate::commands::{Collaborators, StoreLock};
use crate::config::ShelfConfig;
use crate::error::Result;
use crate::model::ShelfEntry;
use crate::patch::builder::ContextDiffBuilder;
use crate::patch::unified::UnifiedDiffCodec;
use crate::progress::{CancellationToken, NoProgress};
use crate::store::ShelfStore;
use crate::working_copy::{FsWorkingCopy, WorkingCopy, WorkingCopyApplier};

/// A store in one temp dir, a working copy in another, and a clock that
/// only moves when a test says so.
pub struct TestEnv {
    // Kept so the directories live as long as the test
    _store_dir: TempDir,
    _wc_dir: TempDir,
    pub store: StoreLock,
    pub collab: Collaborators,
    pub clock: ManualClock,
    pub working_copy: Arc<FsWorkingCopy>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut ShelfConfig)) -> Self {
        let store_dir = tempfile::tempdir().expect("failed to create store dir");
        let wc_dir = tempfile::tempdir().expect("failed to create working copy dir");
        let mut config = ShelfConfig::default();
        adjust(&mut config);

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let working_copy = Arc::new(FsWorkingCopy::new(wc_dir.path()));
        let codec = Arc::new(UnifiedDiffCodec::with_default_extensions());
        let (store, _) = ShelfStore::open(store_dir.path(), codec.as_ref()).unwrap();

        let collab = Collaborators {
            codec,
            builder: Arc::new(ContextDiffBuilder::default()),
            applier: Arc::new(WorkingCopyApplier::new(working_copy.clone())),
            working_copy: working_copy.clone(),
            clock: Arc::new(clock.clone()),
            config,
        };

        Self {
            _store_dir: store_dir,
            _wc_dir: wc_dir,
            store: RwLock::new(store),
            collab,
            clock,
            working_copy,
        }
    }

    pub fn store_root(&self) -> PathBuf {
        self.store.read().root().to_path_buf()
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        use crate::clock::Clock;
        self.clock.now()
    }

    /// Drops the in-memory store and loads it again from disk.
    pub fn reopen(&mut self) {
        let root = self.store_root();
        let (store, _) = ShelfStore::open(root, self.collab.codec.as_ref()).unwrap();
        self.store = RwLock::new(store);
    }

    pub fn write(&self, path: &str, text: &str) {
        self.working_copy.write(path, text.as_bytes()).unwrap();
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.working_copy.read_text(path).unwrap()
    }

    /// A modification whose `after` text is what the working copy holds.
    pub fn modified(&self, path: &str, before: &str, after: &str) -> Change {
        self.write(path, after);
        Change::modified(Revision::text(path, before), Revision::text(path, after))
    }

    pub fn added(&self, path: &str, text: &str) -> Change {
        self.write(path, text);
        Change::added(Revision::text(path, text))
    }

    pub fn deleted(&self, path: &str, before: &str) -> Change {
        self.working_copy.remove(path).unwrap();
        Change::deleted(Revision::text(path, before))
    }

    pub fn added_binary(&self, path: &str, bytes: &[u8]) -> Change {
        self.working_copy.write(path, bytes).unwrap();
        Change::added(Revision::binary(path, bytes.to_vec()))
    }

    pub fn shelve_request(&self, request: ShelveRequest) -> Result<ShelveOutcome> {
        shelve::run(
            &self.store,
            &self.collab,
            &request,
            &NoProgress,
            &CancellationToken::new(),
        )
    }

    pub fn shelve(&self, description: &str, changes: Vec<Change>) -> ShelfEntry {
        self.shelve_request(ShelveRequest::new(description, changes))
            .unwrap()
            .entry
    }

    pub fn entry(&self, name: &str) -> Option<ShelfEntry> {
        self.store.read().find_by_name(name).cloned()
    }
}
