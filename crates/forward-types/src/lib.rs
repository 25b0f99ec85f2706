//! Core types for the stream-forward job.
//!
//! This crate provides the data model shared by every other crate in the
//! workspace:
//!
//! - [`ChangeRecord`] - One mutation reported by the change feed
//! - [`Cursor`] - Opaque feed position persisted between runs
//! - [`StreamMetadata`] - Descriptive attributes of a monitored stream
//! - [`OutputRecord`] - The flat record delivered to the sink
//!
//! It also owns the payload builder ([`build_payload`]), a pure transformation
//! from change records plus metadata into sink records.
//!
//! # Architecture
//!
//! ```text
//! forward-types (this crate)
//!    │
//!    ├─── checkpoint        (persists Cursor values)
//!    ├─── feed-source       (produces ChangeRecord, resolves StreamMetadata)
//!    └─── sink              (delivers OutputRecord batches)
//! ```

pub mod excerpt;
pub mod payload;
pub mod types;

pub use excerpt::{body_excerpt, ERROR_BODY_LIMIT};
pub use payload::{
    build_payload, format_timestamp, upserted_streams, ObservationPolicy, Payload, PayloadError,
};
pub use types::{
    ChangeRecord, Cursor, Mutation, Observation, OutputRecord, StreamId, StreamMetadata,
    Subscription,
};
