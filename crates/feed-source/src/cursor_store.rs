//! Backend-hosted cursor storage.
//!
//! Each state key maps to a string-valued stream with that external id. The
//! stream's latest datapoint is the current cursor; every write inserts a new
//! datapoint, so the stream doubles as an audit log of cursor advancement.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use checkpoint::{CursorStore, StoredCursor};
use chrono::{DateTime, Utc};
use forward_types::Cursor;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::client::{ensure_success, BackendClient};
use crate::wire::{
    ByIdsRequest, CreateStringStream, ExternalId, InsertDatapoints, Items, ItemsResponse,
    LatestItem, StringDatapoint, BY_IDS_PATH, CREATE_PATH, INSERT_PATH, LATEST_PATH,
};

/// Cursor store that keeps each cursor as the latest value of a string stream.
pub struct StreamCursorStore {
    client: BackendClient,
    provisioned: Mutex<HashSet<String>>,
}

impl StreamCursorStore {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            provisioned: Mutex::new(HashSet::new()),
        }
    }

    fn is_provisioned(&self, state_key: &str) -> bool {
        self.provisioned
            .lock()
            .map(|set| set.contains(state_key))
            .unwrap_or(false)
    }

    fn mark_provisioned(&self, state_key: &str) {
        if let Ok(mut set) = self.provisioned.lock() {
            set.insert(state_key.to_string());
        }
    }

    /// Create the backing stream for `state_key` unless it already exists.
    async fn ensure_stream(&self, state_key: &str) -> Result<()> {
        if self.is_provisioned(state_key) {
            return Ok(());
        }

        let lookup = ByIdsRequest {
            items: vec![ExternalId {
                external_id: state_key,
            }],
            ignore_unknown_ids: true,
        };
        let existing: ItemsResponse<serde_json::Value> = self
            .client
            .post(BY_IDS_PATH, &lookup)
            .await
            .with_context(|| format!("Failed to look up cursor stream '{state_key}'"))?;

        if existing.items.is_empty() {
            let create = Items {
                items: vec![CreateStringStream {
                    external_id: state_key,
                    name: state_key,
                    is_string: true,
                }],
            };
            let response = self.client.send(CREATE_PATH, &create).await?;
            if response.status() == StatusCode::CONFLICT {
                // Another run created it between our lookup and create.
                debug!("Cursor stream '{}' already exists", state_key);
            } else {
                ensure_success(CREATE_PATH, response)
                    .await
                    .with_context(|| format!("Failed to create cursor stream '{state_key}'"))?;
                info!("Created cursor stream '{}'", state_key);
            }
        }

        self.mark_provisioned(state_key);
        Ok(())
    }
}

#[async_trait]
impl CursorStore for StreamCursorStore {
    async fn store_cursor(&self, state_key: &str, cursor: &Cursor) -> Result<()> {
        self.ensure_stream(state_key).await?;

        let insert = Items {
            items: vec![InsertDatapoints {
                external_id: state_key,
                datapoints: vec![StringDatapoint {
                    timestamp: Utc::now().timestamp_millis(),
                    value: cursor.as_str().to_string(),
                }],
            }],
        };
        self.client
            .post_unit(INSERT_PATH, &insert)
            .await
            .with_context(|| format!("Failed to write cursor for '{state_key}'"))
    }

    async fn read_cursor(&self, state_key: &str) -> Result<Option<StoredCursor>> {
        self.ensure_stream(state_key).await?;

        let request = Items {
            items: vec![ExternalId {
                external_id: state_key,
            }],
        };
        let response: ItemsResponse<LatestItem> = self
            .client
            .post(LATEST_PATH, &request)
            .await
            .with_context(|| format!("Failed to read cursor for '{state_key}'"))?;

        let Some(latest) = response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.datapoints.into_iter().next())
        else {
            return Ok(None);
        };

        let written_at = DateTime::from_timestamp_millis(latest.timestamp).ok_or_else(|| {
            anyhow!(
                "Cursor for '{state_key}' has invalid timestamp {}",
                latest.timestamp
            )
        })?;

        Ok(Some(StoredCursor {
            cursor: Cursor::new(latest.value),
            written_at,
        }))
    }
}
