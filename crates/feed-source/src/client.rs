//! Shared HTTP client for the time series backend.

use std::time::Duration;

use anyhow::{Context, Result};
use forward_types::{body_excerpt, ERROR_BODY_LIMIT};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Connection settings for the backend.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://api.example.com/api/v1/projects/plant`
    pub endpoint: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Upper bound for a single request, connect through body
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Backend API client.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `body` to `path` without checking the response status.
    pub(crate) async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))
    }

    /// POST `body` to `path` and decode a JSON response.
    pub(crate) async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = ensure_success(path, self.send(path, body).await?).await?;
        response
            .json::<R>()
            .await
            .with_context(|| format!("Invalid response body from {path}"))
    }

    /// POST `body` to `path`, ignoring the response body.
    pub(crate) async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<()> {
        ensure_success(path, self.send(path, body).await?).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into an error quoting the status and body.
pub(crate) async fn ensure_success(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    anyhow::bail!(
        "{path} returned HTTP {status}: {}",
        body_excerpt(&body, ERROR_BODY_LIMIT)
    )
}
