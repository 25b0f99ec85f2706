//! Sink trait definition.
//!
//! This trait abstracts over where forwarded records end up, so the sync
//! engine can be exercised against in-memory sinks in tests and the HTTP
//! sink in production.

use std::sync::Arc;

use anyhow::Result;
use forward_types::OutputRecord;

/// Trait for delivering record batches to an external system.
///
/// # Usage Pattern
///
/// The engine uses generics for zero-cost dispatch:
///
/// ```ignore
/// pub struct SyncEngine<C, F, M, S: Sink> {
///     sink: S,
///     // ...
/// }
/// ```
///
/// A call makes exactly one delivery attempt. Retrying is the caller's
/// decision; implementations must not retry on their own.
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Deliver `batch` as a single unit.
    ///
    /// Returns `Ok(())` only when the sink acknowledged the whole batch.
    async fn publish(&self, batch: &[OutputRecord]) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: Sink + ?Sized> Sink for Arc<T> {
    async fn publish(&self, batch: &[OutputRecord]) -> Result<()> {
        (**self).publish(batch).await
    }
}

#[async_trait::async_trait]
impl<T: Sink + ?Sized> Sink for Box<T> {
    async fn publish(&self, batch: &[OutputRecord]) -> Result<()> {
        (**self).publish(batch).await
    }
}
