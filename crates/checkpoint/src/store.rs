//! Cursor storage trait and types
//!
//! This module defines the CursorStore trait for backend-agnostic cursor
//! storage operations, plus shared types.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forward_types::Cursor;
use serde::{Deserialize, Serialize};

/// Cursor data stored in a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCursor {
    /// Opaque feed cursor
    pub cursor: Cursor,
    /// Wall-clock time of the write
    pub written_at: DateTime<Utc>,
}

impl StoredCursor {
    /// Stamp `cursor` with the current time.
    pub fn now(cursor: Cursor) -> Self {
        Self {
            cursor,
            written_at: Utc::now(),
        }
    }
}

/// Trait for cursor storage operations.
///
/// Implementations must be append-only: `store_cursor` records a new
/// timestamped value and never rewrites an earlier one. If the storage object
/// for a key does not exist yet, both operations create it first; creating is
/// idempotent and tolerates a concurrent creator.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Store a cursor as the newest value for `state_key`.
    async fn store_cursor(&self, state_key: &str, cursor: &Cursor) -> Result<()>;

    /// Read the newest cursor for `state_key`.
    ///
    /// Returns None if nothing was ever written for the key.
    async fn read_cursor(&self, state_key: &str) -> Result<Option<StoredCursor>>;
}

#[async_trait]
impl<T: CursorStore + ?Sized> CursorStore for Arc<T> {
    async fn store_cursor(&self, state_key: &str, cursor: &Cursor) -> Result<()> {
        (**self).store_cursor(state_key, cursor).await
    }

    async fn read_cursor(&self, state_key: &str) -> Result<Option<StoredCursor>> {
        (**self).read_cursor(state_key).await
    }
}

#[async_trait]
impl<T: CursorStore + ?Sized> CursorStore for Box<T> {
    async fn store_cursor(&self, state_key: &str, cursor: &Cursor) -> Result<()> {
        (**self).store_cursor(state_key, cursor).await
    }

    async fn read_cursor(&self, state_key: &str) -> Result<Option<StoredCursor>> {
        (**self).read_cursor(state_key).await
    }
}
