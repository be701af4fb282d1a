//! "Store changed" broadcast.
//!
//! Every mutation sends one payload-less [`StoreChanged`] to each subscriber.
//! Consumers re-query the engine; the message never says what changed.

use parking_lot::Mutex;
use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChanged;

#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Sender<StoreChanged>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StoreChanged> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Notifies every live subscriber, dropping the ones that hung up.
    pub fn broadcast(&self) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(StoreChanged).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_all_subscribers() {
        let notifier = ChangeNotifier::new();
        let a = notifier.subscribe();
        let b = notifier.subscribe();
        notifier.broadcast();
        assert_eq!(a.try_recv(), Ok(StoreChanged));
        assert_eq!(b.try_recv(), Ok(StoreChanged));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let notifier = ChangeNotifier::new();
        let kept = notifier.subscribe();
        drop(notifier.subscribe());
        notifier.broadcast();
        assert_eq!(notifier.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
