//! # Shelf Lifecycle
//!
//! Every shelf entry moves through a small state machine:
//!
//! ```text
//!             recycle                delete
//!   Active ────────────► Recycled ─────────────┐
//!     │  ▲                  │                  ▼
//!     │  └── reactivate ────┘               Deleted ──── purge ───► Purged
//!     │                                      │  ▲
//!     └───────────────── delete ─────────────┘  │
//!     ▲                                         │
//!     └──────────────── restore ────────────────┘
//! ```
//!
//! Purge is accepted from any live state ("delete completely"); there is no
//! way back from `Purged`.
//!
//! ## Pending System Recycle
//!
//! Entries created by automatic flows (e.g. shelving before an update) are
//! marked with `pending_system_recycle`. When such an entry is recycled by a
//! *system* initiator, the mark is consumed and the entry goes straight to
//! `Deleted` instead of `Recycled`. A user-driven recycle ignores the mark.
//! The mark is only accepted on `Active` entries.
//!
//! ## Restore
//!
//! `Deleted` remembers whether the entry was `Recycled` before deletion, so a
//! restore lands back on the state the user deleted from.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ShelfError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Recycled,
    Deleted,
    Purged,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Recycled => "recycled",
            Self::Deleted => "deleted",
            Self::Purged => "purged",
        };
        f.write_str(name)
    }
}

/// Who triggered an operation. Only matters for recycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Initiator {
    #[default]
    User,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Recycle(Initiator),
    MarkToDelete,
    Delete,
    Reactivate,
    Restore,
    Purge,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Recycle(Initiator::User) => "recycle",
            Self::Recycle(Initiator::System) => "system-recycle",
            Self::MarkToDelete => "mark for deletion",
            Self::Delete => "delete",
            Self::Reactivate => "reactivate",
            Self::Restore => "restore",
            Self::Purge => "purge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    state: LifecycleState,
    #[serde(default)]
    pending_system_recycle: bool,
    #[serde(default)]
    recycled_before_delete: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::of(LifecycleState::Active)
    }
}

impl Lifecycle {
    fn of(state: LifecycleState) -> Self {
        Self {
            state,
            pending_system_recycle: false,
            recycled_before_delete: false,
        }
    }

    fn deleted(from_recycled: bool) -> Self {
        Self {
            recycled_before_delete: from_recycled,
            ..Self::of(LifecycleState::Deleted)
        }
    }

    /// A fresh entry created by an automatic flow.
    pub fn marked_for_system_recycle() -> Self {
        Self {
            pending_system_recycle: true,
            ..Self::default()
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    pub fn is_recycled(&self) -> bool {
        self.state == LifecycleState::Recycled
    }

    pub fn is_deleted(&self) -> bool {
        self.state == LifecycleState::Deleted
    }

    pub fn is_marked_to_delete(&self) -> bool {
        self.pending_system_recycle
    }

    /// Whether a restore from `Deleted` lands on `Recycled`.
    pub fn was_recycled(&self) -> bool {
        self.recycled_before_delete
    }

    pub fn can_apply(&self, transition: Transition) -> bool {
        self.apply(transition).is_ok()
    }

    /// Computes the next lifecycle. The match is the whole transition table:
    /// anything not listed is rejected.
    pub fn apply(&self, transition: Transition) -> Result<Lifecycle> {
        use LifecycleState::{Active, Deleted, Purged, Recycled};

        let next = match (self.state, transition) {
            (Active, Transition::Recycle(Initiator::System)) if self.pending_system_recycle => {
                Self::deleted(false)
            }
            (Active | Recycled, Transition::Recycle(_)) => Self::of(Recycled),
            (Active, Transition::MarkToDelete) => Self {
                pending_system_recycle: true,
                ..*self
            },
            (Active, Transition::Delete) => Self::deleted(false),
            (Recycled, Transition::Delete) => Self::deleted(true),
            (Recycled, Transition::Reactivate) => Self::of(Active),
            (Deleted, Transition::Restore) => {
                if self.recycled_before_delete {
                    Self::of(Recycled)
                } else {
                    Self::of(Active)
                }
            }
            (Active | Recycled | Deleted, Transition::Purge) => Self::of(Purged),
            (from, transition) => {
                return Err(ShelfError::InvalidTransition { from, transition });
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Transition; 7] = [
        Transition::Recycle(Initiator::User),
        Transition::Recycle(Initiator::System),
        Transition::MarkToDelete,
        Transition::Delete,
        Transition::Reactivate,
        Transition::Restore,
        Transition::Purge,
    ];

    #[test]
    fn new_entries_are_active_and_unmarked() {
        let life = Lifecycle::default();
        assert!(life.is_active());
        assert!(!life.is_marked_to_delete());
    }

    #[test]
    fn user_recycle_goes_to_recycled() {
        let life = Lifecycle::default()
            .apply(Transition::Recycle(Initiator::User))
            .unwrap();
        assert_eq!(life.state(), LifecycleState::Recycled);
    }

    #[test]
    fn system_recycle_consumes_mark_and_deletes() {
        let life = Lifecycle::marked_for_system_recycle()
            .apply(Transition::Recycle(Initiator::System))
            .unwrap();
        assert_eq!(life.state(), LifecycleState::Deleted);
        assert!(!life.is_marked_to_delete());
        assert!(!life.was_recycled());
    }

    #[test]
    fn user_recycle_ignores_mark() {
        let life = Lifecycle::marked_for_system_recycle()
            .apply(Transition::Recycle(Initiator::User))
            .unwrap();
        assert_eq!(life.state(), LifecycleState::Recycled);
        assert!(!life.is_marked_to_delete());
    }

    #[test]
    fn system_recycle_without_mark_recycles() {
        let life = Lifecycle::default()
            .apply(Transition::Recycle(Initiator::System))
            .unwrap();
        assert_eq!(life.state(), LifecycleState::Recycled);
    }

    #[test]
    fn mark_to_delete_only_on_active() {
        let recycled = Lifecycle::default()
            .apply(Transition::Recycle(Initiator::User))
            .unwrap();
        assert!(matches!(
            recycled.apply(Transition::MarkToDelete),
            Err(ShelfError::InvalidTransition {
                from: LifecycleState::Recycled,
                ..
            })
        ));
    }

    #[test]
    fn restore_returns_to_state_before_delete() {
        let from_active = Lifecycle::default()
            .apply(Transition::Delete)
            .unwrap()
            .apply(Transition::Restore)
            .unwrap();
        assert_eq!(from_active.state(), LifecycleState::Active);

        let from_recycled = Lifecycle::default()
            .apply(Transition::Recycle(Initiator::User))
            .unwrap()
            .apply(Transition::Delete)
            .unwrap();
        assert!(from_recycled.was_recycled());
        let restored = from_recycled.apply(Transition::Restore).unwrap();
        assert_eq!(restored.state(), LifecycleState::Recycled);
    }

    #[test]
    fn purged_is_terminal() {
        let purged = Lifecycle::default().apply(Transition::Purge).unwrap();
        for t in ALL {
            assert!(!purged.can_apply(t), "purged accepted {t}");
        }
    }

    #[test]
    fn deleted_only_restores_or_purges() {
        let deleted = Lifecycle::default().apply(Transition::Delete).unwrap();
        let allowed: Vec<Transition> = ALL
            .into_iter()
            .filter(|t| deleted.can_apply(*t))
            .collect();
        assert_eq!(allowed, vec![Transition::Restore, Transition::Purge]);
    }

    #[test]
    fn active_rejects_restore_and_reactivate() {
        let active = Lifecycle::default();
        assert!(!active.can_apply(Transition::Restore));
        assert!(!active.can_apply(Transition::Reactivate));
    }

    #[test]
    fn serializes_as_plain_record() {
        let life = Lifecycle::marked_for_system_recycle();
        let json = serde_json::to_string(&life).unwrap();
        assert!(json.contains("\"state\":\"active\""));
        let back: Lifecycle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, life);
    }
}
