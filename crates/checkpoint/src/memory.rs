//! In-process cursor storage.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use forward_types::Cursor;

use crate::store::{CursorStore, StoredCursor};

/// In-memory, append-only cursor store.
///
/// Keeps every write so callers can inspect how a key advanced.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<StoredCursor>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `state_key` with an initial cursor.
    pub fn with_cursor(state_key: &str, cursor: impl Into<Cursor>) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries
                .entry(state_key.to_string())
                .or_default()
                .push(StoredCursor::now(cursor.into()));
        }
        store
    }

    /// Every cursor written for `state_key`, oldest first.
    pub fn history(&self, state_key: &str) -> Vec<StoredCursor> {
        self.entries
            .lock()
            .map(|entries| entries.get(state_key).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of writes made for `state_key`.
    pub fn write_count(&self, state_key: &str) -> usize {
        self.history(state_key).len()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn store_cursor(&self, state_key: &str, cursor: &Cursor) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cursor store lock poisoned"))?;
        entries
            .entry(state_key.to_string())
            .or_default()
            .push(StoredCursor::now(cursor.clone()));
        Ok(())
    }

    async fn read_cursor(&self, state_key: &str) -> Result<Option<StoredCursor>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cursor store lock poisoned"))?;
        Ok(entries.get(state_key).and_then(|h| h.last().cloned()))
    }
}
