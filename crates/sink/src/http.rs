//! HTTP/HTTPS sink implementation

use std::time::Duration;

use anyhow::{Context, Result};
use forward_types::{body_excerpt, OutputRecord, ERROR_BODY_LIMIT};

use crate::traits::Sink;

/// Delivers batches with one JSON POST per batch.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    /// Create a sink posting to `url`, giving up on a request after `timeout`.
    ///
    /// # Example
    /// ```ignore
    /// let sink = HttpSink::new(
    ///     "https://ingest.example.com/readings".to_string(),
    ///     Duration::from_secs(30),
    /// )?;
    /// sink.publish(&records).await?;
    /// ```
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build sink HTTP client")?;

        Ok(Self { client, url })
    }
}

#[async_trait::async_trait]
impl Sink for HttpSink {
    async fn publish(&self, batch: &[OutputRecord]) -> Result<()> {
        // `.json()` sets Content-Type: application/json
        let response = self
            .client
            .post(&self.url)
            .json(batch)
            .send()
            .await
            .context("Failed to deliver batch to sink")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Sink rejected batch with HTTP {status}: {}",
                body_excerpt(&body, ERROR_BODY_LIMIT)
            );
        }

        tracing::debug!("Sink accepted {} records ({})", batch.len(), status);
        Ok(())
    }
}
