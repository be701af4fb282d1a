//! # Shelfapp Architecture
//!
//! Shelfapp is a **UI-agnostic change-shelving library**. It sets aside
//! working-copy edits (text and binary) as named, durable entries, applies
//! them back later in whole or in part, and walks each entry through a
//! lifecycle of Active, Recycled, Deleted and finally Purged.
//!
//! ## The Three-Layer Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Engine Layer (engine.rs)                                   │
//! │  - Thin facade over commands                                │
//! │  - Owns the store lock, collaborators and the notifier      │
//! │  - Returns structured Result types                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs)                              │
//! │  - Business logic: shelve, unshelve, split, delete, ...     │
//! │  - Operates on Rust types, returns Rust types               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - ShelfStore: index + one directory per entry              │
//! │  - Atomic writes, reconciliation on open                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Around the layers sit the seams a host plugs into: [`patch::PatchCodec`],
//! [`patch::PatchBuilder`], [`working_copy::PatchApplier`] and
//! [`working_copy::WorkingCopy`]. Filesystem defaults exist for all of them.
//!
//! ## Key Principle: No I/O Assumptions in Core
//!
//! The library:
//! - **Never** writes to stdout/stderr (it logs through `tracing`)
//! - **Never** installs a tracing subscriber; the host does
//! - **Never** panics on bad input; errors come back as [`error::ShelfError`]
//!
//! ## Testing Strategy
//!
//! 1. **Commands** (`commands/*.rs`): thorough unit tests on a temp store.
//!    This is where the lion's share of testing lives.
//! 2. **Engine** (`engine.rs`): dispatch, eventing and rollback ordering.
//! 3. **Workflows** (`tests/`): whole scenarios through the public API.
//!
//! The `test_utils` feature exposes the `TestEnv` fixture to other crates.
//!
//! ## Module Overview
//!
//! - [`engine`]: The facade, entry point for all operations
//! - [`commands`]: Business logic for each operation
//! - [`store`]: Persistent entry collection and on-disk layout
//! - [`model`]: Entries, change records, the change cache
//! - [`lifecycle`]: The entry state machine
//! - [`change`]: Working-copy changes handed to the engine
//! - [`patch`]: Patch model, unified diff codec, extensions, hunk application
//! - [`working_copy`]: File access and patch application seams
//! - [`janitor`]: Scheduled purge of expired entries
//! - [`events`]: "Store changed" broadcast
//! - [`progress`]: Progress reporting and cancellation
//! - [`clock`]: Time source, real or virtual
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod change;
pub mod clock;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod janitor;
pub mod lifecycle;
pub mod model;
pub mod patch;
pub mod progress;
pub mod store;
pub mod working_copy;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use engine::{ShelfEngine, ShelfEngineBuilder};
pub use error::{Result, ShelfError};
