//! Configuration helpers shared by the CLI and library entry points.

pub mod duration;

pub use duration::parse_duration;
