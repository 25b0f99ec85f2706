//! Payload construction: change records + stream metadata → sink records.
//!
//! Only upserts are forwarded. By default each upsert contributes its first
//! observation; anything after it is counted in
//! [`Payload::dropped_observations`] so callers can report the loss.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat};
use thiserror::Error;

use crate::types::{ChangeRecord, Observation, OutputRecord, StreamId, StreamMetadata};

/// Which observations of an upsert record become output records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationPolicy {
    /// Only the first observation of each record.
    #[default]
    First,
    /// Every observation, in the order the feed reported them.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("no metadata for stream {0}")]
    MissingMetadata(StreamId),
    #[error("timestamp {0} ms is outside the representable range")]
    InvalidTimestamp(i64),
}

/// Built sink batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload {
    pub records: Vec<OutputRecord>,
    /// Observations present in the feed but not represented in `records`.
    pub dropped_observations: usize,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Stream ids referenced by upsert records, i.e. the ids whose metadata is
/// needed to build a payload.
pub fn upserted_streams(records: &[ChangeRecord]) -> BTreeSet<StreamId> {
    records
        .iter()
        .filter(|r| r.is_upsert())
        .map(|r| r.stream_id)
        .collect()
}

/// Format epoch milliseconds as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn format_timestamp(epoch_millis: i64) -> Result<String, PayloadError> {
    let at = DateTime::from_timestamp_millis(epoch_millis)
        .ok_or(PayloadError::InvalidTimestamp(epoch_millis))?;
    Ok(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Build the sink batch for `records`.
///
/// Output order follows input order. Records for the same stream are never
/// merged.
pub fn build_payload(
    records: &[ChangeRecord],
    metadata: &HashMap<StreamId, StreamMetadata>,
    policy: ObservationPolicy,
) -> Result<Payload, PayloadError> {
    let mut payload = Payload::default();

    for record in records.iter().filter(|r| r.is_upsert()) {
        let Some((first, rest)) = record.observations.split_first() else {
            continue;
        };

        let meta = metadata
            .get(&record.stream_id)
            .ok_or(PayloadError::MissingMetadata(record.stream_id))?;

        payload.records.push(output_record(first, meta)?);

        match policy {
            ObservationPolicy::First => payload.dropped_observations += rest.len(),
            ObservationPolicy::All => {
                for observation in rest {
                    payload.records.push(output_record(observation, meta)?);
                }
            }
        }
    }

    Ok(payload)
}

fn output_record(
    observation: &Observation,
    meta: &StreamMetadata,
) -> Result<OutputRecord, PayloadError> {
    Ok(OutputRecord {
        timestamp: format_timestamp(observation.timestamp)?,
        value: observation.value,
        unit: meta.unit.clone(),
        sensor: meta.name.clone(),
        tag: meta.external_id.clone(),
    })
}
