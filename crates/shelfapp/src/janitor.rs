//! Background purge of expired Deleted entries.
//!
//! The janitor is a named worker thread that wakes up every
//! `janitor_interval` and runs [`ShelfEngine::purge_expired`]. It holds only a
//! weak reference to the engine and exits on its own once the engine is gone.
//! [`JanitorHandle::stop`] (or dropping the handle) wakes it immediately and
//! joins it.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::ShelfEngine;
use crate::error::Result;

pub struct JanitorHandle {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl JanitorHandle {
    /// Stops the worker and waits for it to finish its current run.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("janitor thread panicked");
            }
        }
    }
}

impl Drop for JanitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One janitor pass. Returns the names of purged entries.
pub fn run_once(engine: &ShelfEngine) -> Result<Vec<String>> {
    let purged = engine.purge_expired()?;
    info!(purged = purged.len(), "janitor run finished");
    Ok(purged)
}

/// Starts the janitor with the engine's configured interval.
pub fn spawn(engine: &Arc<ShelfEngine>) -> Result<JanitorHandle> {
    spawn_with_interval(engine, engine.config().janitor_interval())
}

pub fn spawn_with_interval(engine: &Arc<ShelfEngine>, interval: Duration) -> Result<JanitorHandle> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let engine: Weak<ShelfEngine> = Arc::downgrade(engine);

    let worker = thread::Builder::new()
        .name("shelf-janitor".to_owned())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(engine) = engine.upgrade() else {
                        debug!("engine dropped, janitor exiting");
                        break;
                    };
                    if let Err(err) = run_once(&engine) {
                        warn!(error = %err, "janitor run failed");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("janitor stopped");
                    break;
                }
            }
        })?;

    debug!(interval_secs = interval.as_secs(), "janitor started");
    Ok(JanitorHandle {
        stop_tx: Some(stop_tx),
        worker: Some(worker),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{Change, Revision};
    use crate::clock::ManualClock;
    use crate::commands::delete::DeleteRequest;
    use crate::commands::shelve::ShelveRequest;
    use crate::progress::{CancellationToken, NoProgress};
    use crate::working_copy::FsWorkingCopy;
    use std::time::Instant;
    use tempfile::TempDir;

    fn engine_with_deleted_entry() -> (TempDir, TempDir, Arc<ShelfEngine>, ManualClock, String) {
        let store = TempDir::new().unwrap();
        let wc = TempDir::new().unwrap();
        let clock = ManualClock::default();
        let (engine, _) = ShelfEngine::builder(store.path(), Arc::new(FsWorkingCopy::new(wc.path())))
            .with_clock(Arc::new(clock.clone()))
            .open()
            .unwrap();
        let request = ShelveRequest::new(
            "expiring",
            vec![Change::added(Revision::text("a.txt", "a\n"))],
        );
        let name = engine
            .shelve(&request, &NoProgress, &CancellationToken::new())
            .unwrap()
            .entry
            .name;
        engine
            .delete_shelves(&DeleteRequest {
                entries: vec![name.clone()],
                ..Default::default()
            })
            .unwrap();
        (store, wc, Arc::new(engine), clock, name)
    }

    #[test]
    fn run_once_purges_only_after_retention() {
        let (_s, _w, engine, clock, name) = engine_with_deleted_entry();
        assert!(run_once(&engine).unwrap().is_empty());
        clock.advance(chrono::Duration::days(7) + chrono::Duration::seconds(1));
        assert_eq!(run_once(&engine).unwrap(), vec![name]);
    }

    #[test]
    fn background_thread_purges_on_schedule() {
        let (_s, _w, engine, clock, name) = engine_with_deleted_entry();
        clock.advance(chrono::Duration::days(30));
        let rx = engine.subscribe();

        let handle = spawn_with_interval(&engine, Duration::from_millis(10)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.stop();

        assert!(engine.find(&name).is_none());
    }

    #[test]
    fn stop_returns_promptly() {
        let (_s, _w, engine, _clock, _name) = engine_with_deleted_entry();
        let handle = spawn_with_interval(&engine, Duration::from_secs(3600)).unwrap();
        assert!(handle.is_running());

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn exits_when_engine_is_dropped() {
        let (_s, _w, engine, _clock, _name) = engine_with_deleted_entry();
        let handle = spawn_with_interval(&engine, Duration::from_millis(5)).unwrap();
        drop(engine);

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.is_running());
    }
}
