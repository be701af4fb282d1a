use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::{LifecycleState, Transition};

#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("Shelf not found: {0}")]
    EntryNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] confique::Error),

    /// The patch file exists but cannot be parsed.
    #[error("Cannot read shelf patch {path}: {message}")]
    CorruptPatch { path: PathBuf, message: String },

    /// Stored hunks no longer apply to the current content.
    #[error("Conflict in {path}: {message}")]
    Conflict { path: String, message: String },

    #[error("Cannot {transition} a shelf that is {from}")]
    InvalidTransition {
        from: LifecycleState,
        transition: Transition,
    },

    /// A change path that is absolute or climbs out of the working copy.
    #[error("Path escapes the working copy: {0}")]
    UnsafePath(String),

    #[error("No patches found in {0}")]
    EmptyImport(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(String),
}

impl ShelfError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptPatch {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShelfError>;
