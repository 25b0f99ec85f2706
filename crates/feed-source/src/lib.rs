//! Time series backend integration for stream-forward
//!
//! Everything the forwarding job reads from (or persists to) the backend:
//!
//! - [`HttpChangeFeed`] - pages through a change subscription
//! - [`BackendMetadata`] / [`MetadataCache`] - resolve stream ids to metadata
//! - [`StreamCursorStore`] - keeps cursors as the latest value of a string stream
//!
//! All of them share one [`BackendClient`], which owns the HTTP connection
//! pool, credentials and request timeout.

mod client;
mod cursor_store;
pub mod feed;
pub mod metadata;
mod wire;

pub use client::{BackendClient, BackendConfig};
pub use cursor_store::StreamCursorStore;
pub use feed::{ChangeBatch, ChangeFeed, FeedPage, HttpChangeFeed, PagedFeed};
pub use metadata::{BackendMetadata, MetadataCache, MetadataResolver};

/// Default number of updates requested per feed page.
pub const DEFAULT_PAGE_LIMIT: usize = 100;
