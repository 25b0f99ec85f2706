//! Change feed client.
//!
//! The backend serves a subscription's changes in pages. Callers never see
//! pages: [`ChangeFeed::fetch_changes`] drains every page currently available
//! and returns the records together with the cursor of the last page. A
//! failure on any page fails the whole call, so no cursor is ever returned for
//! a partial drain.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use forward_types::{ChangeRecord, Cursor};
use tracing::debug;

use crate::client::BackendClient;
use crate::wire::{SubscriptionDataRequest, SubscriptionDataResponse, SUBSCRIPTION_DATA_PATH};
use crate::DEFAULT_PAGE_LIMIT;

/// One page of a subscription's changes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub records: Vec<ChangeRecord>,
    /// Position after this page
    pub cursor: Cursor,
    /// Whether more changes are available beyond `cursor`
    pub has_next: bool,
}

/// Every change available since a cursor, in feed order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub records: Vec<ChangeRecord>,
    /// Position after the last record
    pub cursor: Cursor,
}

/// Source of change pages for a subscription.
#[async_trait]
pub trait PagedFeed: Send + Sync {
    /// Fetch the page that starts at `cursor` (or at the feed origin).
    async fn fetch_page(&self, subscription: &str, cursor: Option<&Cursor>) -> Result<FeedPage>;
}

/// Drain-to-head view of a change feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Fetch every change after `cursor` (or from the feed origin).
    ///
    /// An empty batch means the subscription is caught up.
    async fn fetch_changes(&self, subscription: &str, cursor: Option<&Cursor>)
        -> Result<ChangeBatch>;
}

#[async_trait]
impl<P: PagedFeed + ?Sized> ChangeFeed for P {
    async fn fetch_changes(
        &self,
        subscription: &str,
        cursor: Option<&Cursor>,
    ) -> Result<ChangeBatch> {
        let mut records = Vec::new();
        let mut position = cursor.cloned();
        let mut pages = 0usize;

        let final_cursor = loop {
            let page = self
                .fetch_page(subscription, position.as_ref())
                .await
                .with_context(|| {
                    format!(
                        "Failed to fetch page {} of subscription '{subscription}'",
                        pages + 1
                    )
                })?;
            pages += 1;

            if page.has_next && page.records.is_empty() && position.as_ref() == Some(&page.cursor)
            {
                anyhow::bail!(
                    "Subscription '{subscription}' reported more pages but did not advance past cursor {}",
                    page.cursor
                );
            }

            debug!(
                "Fetched page {} of '{}': {} records, has_next={}",
                pages,
                subscription,
                page.records.len(),
                page.has_next
            );
            records.extend(page.records);

            if !page.has_next {
                break page.cursor;
            }
            position = Some(page.cursor);
        };

        debug!(
            "Drained {} records in {} pages from '{}'",
            records.len(),
            pages,
            subscription
        );

        Ok(ChangeBatch {
            records,
            cursor: final_cursor,
        })
    }
}

#[async_trait]
impl<T: PagedFeed + ?Sized> PagedFeed for Arc<T> {
    async fn fetch_page(&self, subscription: &str, cursor: Option<&Cursor>) -> Result<FeedPage> {
        (**self).fetch_page(subscription, cursor).await
    }
}

/// Change feed served by the backend's subscription API.
pub struct HttpChangeFeed {
    client: BackendClient,
    limit: usize,
}

impl HttpChangeFeed {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    /// Set the number of updates requested per page.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

#[async_trait]
impl PagedFeed for HttpChangeFeed {
    async fn fetch_page(&self, subscription: &str, cursor: Option<&Cursor>) -> Result<FeedPage> {
        let request = SubscriptionDataRequest {
            external_id: subscription,
            cursor: cursor.map(Cursor::as_str),
            limit: self.limit,
        };

        let response: SubscriptionDataResponse =
            self.client.post(SUBSCRIPTION_DATA_PATH, &request).await?;

        Ok(FeedPage {
            records: response
                .updates
                .into_iter()
                .flat_map(|update| update.into_records())
                .collect(),
            cursor: Cursor::new(response.cursor),
            has_next: response.has_next,
        })
    }
}
