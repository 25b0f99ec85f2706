//! Cursor management for stream-forward
//!
//! Provides storage-agnostic persistence of change feed cursors, keyed by a
//! state key (one key per subscription).
//!
//! # Architecture
//!
//! This crate provides a generic cursor store that:
//! - Defines the `CursorStore` trait every backend implements
//! - Defines `StoredCursor`, a cursor plus the wall-clock time it was written
//! - Ships local backends; the backend-hosted store lives in `feed-source`
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Appends cursors to one JSON-lines file per state key
//! - `MemoryStore` - In-process store for embedding callers and tests
//! - `StreamCursorStore` - Latest value of a string stream on the backend (in
//!   the feed-source crate)
//!
//! Every backend is append-only: writing a cursor adds a new timestamped
//! entry and the most recent entry is the current cursor.

mod filesystem;
mod memory;
pub mod store;


pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use store::{CursorStore, StoredCursor};
