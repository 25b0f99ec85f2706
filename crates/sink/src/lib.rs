//! Sink abstraction for stream-forward.
//!
//! The engine is written against the [`Sink`] trait; [`HttpSink`] is the
//! production implementation that POSTs batches as JSON.

mod http;
mod traits;

pub use http::HttpSink;
pub use traits::Sink;
