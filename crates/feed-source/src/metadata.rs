//! Stream metadata resolution.
//!
//! Lookups are batched: one request per resolve call, never one per record.
//! A resolve fails as a whole if any requested stream is unknown, since a
//! change record pointing at a missing stream means the feed and the metadata
//! disagree.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use forward_types::{StreamId, StreamMetadata};
use tracing::debug;

use crate::client::BackendClient;
use crate::wire::{ByIdsRequest, InternalId, ItemsResponse, BY_IDS_PATH};

/// Resolves stream ids to their metadata.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resolve every id in `ids`, or fail naming the ids that are missing.
    async fn resolve(&self, ids: &BTreeSet<StreamId>) -> Result<HashMap<StreamId, StreamMetadata>>;
}

#[async_trait]
impl<T: MetadataResolver + ?Sized> MetadataResolver for Arc<T> {
    async fn resolve(&self, ids: &BTreeSet<StreamId>) -> Result<HashMap<StreamId, StreamMetadata>> {
        (**self).resolve(ids).await
    }
}

fn ensure_complete(
    ids: &BTreeSet<StreamId>,
    found: &HashMap<StreamId, StreamMetadata>,
) -> Result<()> {
    let missing: Vec<String> = ids
        .iter()
        .filter(|id| !found.contains_key(id))
        .map(|id| id.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} referenced stream(s) not found: {}",
            missing.len(),
            missing.join(", ")
        ))
    }
}

/// Metadata looked up on the backend.
pub struct BackendMetadata {
    client: BackendClient,
}

impl BackendMetadata {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataResolver for BackendMetadata {
    async fn resolve(&self, ids: &BTreeSet<StreamId>) -> Result<HashMap<StreamId, StreamMetadata>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let request = ByIdsRequest {
            items: ids.iter().map(|id| InternalId { id: id.0 }).collect(),
            // Unknown ids are reported by ensure_complete with their values.
            ignore_unknown_ids: true,
        };
        let response: ItemsResponse<StreamMetadata> =
            self.client.post(BY_IDS_PATH, &request).await?;

        let found: HashMap<StreamId, StreamMetadata> = response
            .items
            .into_iter()
            .filter(|meta| ids.contains(&meta.id))
            .map(|meta| (meta.id, meta))
            .collect();
        ensure_complete(ids, &found)?;

        debug!("Resolved metadata for {} streams", found.len());
        Ok(found)
    }
}

/// In-process cache in front of a resolver.
///
/// Metadata is reference data that this job never mutates, so entries stay
/// cached for the life of the process. Only ids not yet cached are sent to
/// the inner resolver, in one batch.
pub struct MetadataCache<R> {
    inner: R,
    entries: RwLock<HashMap<StreamId, StreamMetadata>>,
}

impl<R: MetadataResolver> MetadataCache<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<R: MetadataResolver> MetadataResolver for MetadataCache<R> {
    async fn resolve(&self, ids: &BTreeSet<StreamId>) -> Result<HashMap<StreamId, StreamMetadata>> {
        let misses: BTreeSet<StreamId> = {
            let entries = self
                .entries
                .read()
                .map_err(|_| anyhow!("metadata cache lock poisoned"))?;
            ids.iter()
                .filter(|id| !entries.contains_key(id))
                .copied()
                .collect()
        };

        if !misses.is_empty() {
            debug!(
                "Metadata cache: {} hits, {} misses",
                ids.len() - misses.len(),
                misses.len()
            );
            let fetched = self.inner.resolve(&misses).await?;
            ensure_complete(&misses, &fetched)?;

            let mut entries = self
                .entries
                .write()
                .map_err(|_| anyhow!("metadata cache lock poisoned"))?;
            entries.extend(fetched);
        }

        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("metadata cache lock poisoned"))?;
        let resolved: HashMap<StreamId, StreamMetadata> = ids
            .iter()
            .filter_map(|id| entries.get(id).map(|meta| (*id, meta.clone())))
            .collect();
        ensure_complete(ids, &resolved)?;
        Ok(resolved)
    }
}
