//! Data model for change forwarding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal numeric identifier of a monitored stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub i64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for StreamId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Opaque change feed position.
///
/// A cursor means "every change up to this point has been processed". Its
/// contents belong to the feed; nothing in this workspace parses them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Cursor {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// A change subscription on the backend.
///
/// Provisioned outside this job; only `external_id` is used when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub external_id: String,
    /// Parallelism hint reported by the backend.
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,
}

fn default_partition_count() -> u32 {
    1
}

impl Subscription {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            partition_count: default_partition_count(),
        }
    }
}

/// A single (timestamp, value) pair reported for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Kind of mutation a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    /// Observations were inserted or overwritten.
    Upsert,
    /// Observations were removed. Never forwarded.
    Delete,
    /// Anything else the feed reports.
    Other,
}

/// One reported mutation to a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub stream_id: StreamId,
    pub mutation: Mutation,
    pub observations: Vec<Observation>,
}

impl ChangeRecord {
    pub fn upsert(stream_id: impl Into<StreamId>, observations: Vec<Observation>) -> Self {
        Self {
            stream_id: stream_id.into(),
            mutation: Mutation::Upsert,
            observations,
        }
    }

    pub fn delete(stream_id: impl Into<StreamId>) -> Self {
        Self {
            stream_id: stream_id.into(),
            mutation: Mutation::Delete,
            observations: Vec::new(),
        }
    }

    pub fn is_upsert(&self) -> bool {
        self.mutation == Mutation::Upsert
    }
}

/// Descriptive record for a monitored stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    pub id: StreamId,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
}

/// Record delivered to the sink.
///
/// Field names and order are the sink's declared schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// ISO-8601 UTC with millisecond precision and a `Z` suffix.
    pub timestamp: String,
    pub value: f64,
    pub unit: String,
    /// Display name of the stream.
    pub sensor: String,
    /// External identifier of the stream.
    pub tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_serializes_as_plain_string() {
        let cursor = Cursor::new("c9");
        assert_eq!(serde_json::to_string(&cursor).unwrap(), "\"c9\"");

        let parsed: Cursor = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(parsed.as_str(), "abc");
    }

    #[test]
    fn test_metadata_missing_fields_default_to_empty() {
        let meta: StreamMetadata = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(meta.id, StreamId(7));
        assert_eq!(meta.external_id, "");
        assert_eq!(meta.name, "");
        assert_eq!(meta.unit, "");
    }

    #[test]
    fn test_subscription_defaults_partition_count() {
        let sub: Subscription = serde_json::from_str(r#"{"externalId": "sensors"}"#).unwrap();
        assert_eq!(sub, Subscription::new("sensors"));
    }
}
