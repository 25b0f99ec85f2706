//! stream-forward library
//!
//! Forwards new values of monitored time series to an HTTP sink. Each run
//! drains a change subscription from the last durably stored cursor, builds
//! one JSON batch from the upserted values, delivers it, and only then
//! advances the cursor.
//!
//! # Crates
//!
//! - `forward_types` - data model and payload builder
//! - `checkpoint` - cursor store trait, filesystem and in-memory stores
//! - `stream_forward_feed_source` - backend change feed, metadata, cursor stream
//! - `stream_forward_sink` - sink trait and HTTP sink
//!
//! # CLI Usage
//!
//! ```bash
//! # One forwarding run (what the scheduler invokes)
//! stream-forward run \
//!   --feed-endpoint https://api.example.com/api/v1/projects/plant \
//!   --subscription plant-sensors \
//!   --state-key plant-sensors-cursor \
//!   --sink-url https://ingest.example.com/readings
//!
//! # Inspect the stored cursor
//! stream-forward cursor show --feed-endpoint ... --state-key plant-sensors-cursor
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use checkpoint::{CursorStore, FilesystemStore};
use clap::{Parser, ValueEnum};
use forward_types::ObservationPolicy;
use stream_forward_feed_source::{
    BackendClient, BackendConfig, BackendMetadata, HttpChangeFeed, MetadataCache,
    StreamCursorStore,
};
use stream_forward_sink::HttpSink;

pub mod config;
pub mod sync;

pub use sync::{RunOutcome, SyncConfig, SyncEngine, SyncError, SyncStep};

/// Backend connection options
#[derive(Parser, Clone, Debug)]
pub struct BackendOpts {
    /// Time series API base URL
    #[arg(long, env = "FEED_ENDPOINT")]
    pub feed_endpoint: String,

    /// Bearer token for the time series API
    #[arg(long, env = "FEED_TOKEN", hide_env_values = true)]
    pub feed_token: Option<String>,

    /// Timeout for each HTTP request (e.g. "30s", "2m", "500ms")
    #[arg(long, default_value = "30s")]
    pub request_timeout: String,
}

/// Where and under which key the cursor is stored
#[derive(Parser, Clone, Debug)]
pub struct CursorOpts {
    /// State key holding the cursor for this subscription
    #[arg(long, env = "FORWARD_STATE_KEY")]
    pub state_key: String,

    /// Cursor storage backend
    #[arg(long, value_enum, default_value = "backend")]
    pub cursor_store: CursorStoreKind,

    /// Directory for the filesystem cursor store
    #[arg(long, default_value = ".stream-forward-cursors")]
    pub cursor_dir: PathBuf,
}

/// Sink options
#[derive(Parser, Clone, Debug)]
pub struct SinkOpts {
    /// URL the record batches are POSTed to
    #[arg(long, env = "SINK_URL", hide_env_values = true)]
    pub sink_url: String,
}

/// Options for one forwarding run
#[derive(Parser, Clone, Debug)]
pub struct RunOpts {
    #[command(flatten)]
    pub backend: BackendOpts,

    #[command(flatten)]
    pub cursor: CursorOpts,

    #[command(flatten)]
    pub sink: SinkOpts,

    /// External id of the change subscription
    #[arg(long, env = "FORWARD_SUBSCRIPTION")]
    pub subscription: String,

    /// Number of updates requested per feed page
    #[arg(long, default_value_t = stream_forward_feed_source::DEFAULT_PAGE_LIMIT)]
    pub page_limit: usize,

    /// Upper bound for each step of a run, including a full feed drain
    #[arg(long, default_value = "5m")]
    pub step_timeout: String,

    /// Forward every observation of a change record instead of only the first
    #[arg(long)]
    pub all_observations: bool,

    /// Build the batch but do not publish it or advance the cursor
    #[arg(long)]
    pub dry_run: bool,
}

/// Options for inspecting a stored cursor
///
/// The backend is only contacted when cursors are kept there, so the endpoint
/// is optional here.
#[derive(Parser, Clone, Debug)]
pub struct CursorShowOpts {
    /// Time series API base URL (required with `--cursor-store backend`)
    #[arg(long, env = "FEED_ENDPOINT")]
    pub feed_endpoint: Option<String>,

    /// Bearer token for the time series API
    #[arg(long, env = "FEED_TOKEN", hide_env_values = true)]
    pub feed_token: Option<String>,

    /// Timeout for each HTTP request (e.g. "30s", "2m", "500ms")
    #[arg(long, default_value = "30s")]
    pub request_timeout: String,

    #[command(flatten)]
    pub cursor: CursorOpts,
}

impl CursorShowOpts {
    /// Open the selected cursor store, building a backend client only when
    /// the cursors live on the backend.
    pub fn open_store(&self) -> anyhow::Result<Arc<dyn CursorStore>> {
        match CursorStorage::from(&self.cursor) {
            CursorStorage::Filesystem { dir } => Ok(Arc::new(FilesystemStore::new(dir))),
            CursorStorage::Backend => {
                let endpoint = self
                    .feed_endpoint
                    .clone()
                    .context("--feed-endpoint is required with --cursor-store backend")?;
                let backend = BackendOpts {
                    feed_endpoint: endpoint,
                    feed_token: self.feed_token.clone(),
                    request_timeout: self.request_timeout.clone(),
                };
                let client = BackendClient::new(&BackendConfig::try_from(&backend)?)?;
                Ok(open_cursor_store(&CursorStorage::Backend, &client))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CursorStoreKind {
    /// Latest value of a string time series named after the state key
    #[value(name = "backend")]
    Backend,
    /// JSON-lines files in --cursor-dir
    #[value(name = "filesystem")]
    Filesystem,
}

/// Cursor storage selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CursorStorage {
    /// Store cursors on the time series backend
    Backend,
    /// Store cursors as files under `dir`
    Filesystem { dir: PathBuf },
}

impl From<&CursorOpts> for CursorStorage {
    fn from(opts: &CursorOpts) -> Self {
        match opts.cursor_store {
            CursorStoreKind::Backend => CursorStorage::Backend,
            CursorStoreKind::Filesystem => CursorStorage::Filesystem {
                dir: opts.cursor_dir.clone(),
            },
        }
    }
}

/// Everything a forwarding run needs, resolved from CLI options or built by
/// an embedding caller.
#[derive(Clone)]
pub struct ForwarderConfig {
    pub backend: BackendConfig,
    pub subscription: String,
    pub state_key: String,
    pub sink_url: String,
    pub page_limit: usize,
    pub step_timeout: Duration,
    pub cursor_storage: CursorStorage,
    pub observation_policy: ObservationPolicy,
    pub dry_run: bool,
}

impl ForwarderConfig {
    /// Engine settings derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            subscription: self.subscription.clone(),
            state_key: self.state_key.clone(),
            call_timeout: self.step_timeout,
            observation_policy: self.observation_policy,
            dry_run: self.dry_run,
        }
    }
}

impl TryFrom<&BackendOpts> for BackendConfig {
    type Error = anyhow::Error;

    fn try_from(opts: &BackendOpts) -> anyhow::Result<Self> {
        let request_timeout = config::parse_duration(&opts.request_timeout)
            .context("Invalid --request-timeout")?;
        Ok(BackendConfig {
            endpoint: opts.feed_endpoint.clone(),
            token: opts.feed_token.clone(),
            request_timeout,
        })
    }
}

impl TryFrom<&RunOpts> for ForwarderConfig {
    type Error = anyhow::Error;

    fn try_from(opts: &RunOpts) -> anyhow::Result<Self> {
        let step_timeout =
            config::parse_duration(&opts.step_timeout).context("Invalid --step-timeout")?;
        let observation_policy = if opts.all_observations {
            ObservationPolicy::All
        } else {
            ObservationPolicy::First
        };

        Ok(ForwarderConfig {
            backend: BackendConfig::try_from(&opts.backend)?,
            subscription: opts.subscription.clone(),
            state_key: opts.cursor.state_key.clone(),
            sink_url: opts.sink.sink_url.clone(),
            page_limit: opts.page_limit,
            step_timeout,
            cursor_storage: CursorStorage::from(&opts.cursor),
            observation_policy,
            dry_run: opts.dry_run,
        })
    }
}

/// Open the configured cursor store.
pub fn open_cursor_store(storage: &CursorStorage, client: &BackendClient) -> Arc<dyn CursorStore> {
    match storage {
        CursorStorage::Backend => Arc::new(StreamCursorStore::new(client.clone())),
        CursorStorage::Filesystem { dir } => Arc::new(FilesystemStore::new(dir.clone())),
    }
}

/// Entry point for one scheduled invocation: wire the backend, cursor store,
/// metadata cache and sink from `config` and perform a single run.
pub async fn forward_changes(config: &ForwarderConfig) -> anyhow::Result<RunOutcome> {
    let client = BackendClient::new(&config.backend)?;

    let cursors = open_cursor_store(&config.cursor_storage, &client);
    let feed = HttpChangeFeed::new(client.clone()).with_limit(config.page_limit);
    let metadata = MetadataCache::new(BackendMetadata::new(client));
    let sink = HttpSink::new(config.sink_url.clone(), config.backend.request_timeout)?;

    let engine = SyncEngine::new(config.sync_config(), cursors, feed, metadata, sink);
    Ok(engine.run().await?)
}
