//! Cursor-tracked change forwarding.
//!
//! One [`SyncEngine::run`] moves the forwarder through these states:
//!
//! ```text
//! Init → CursorLoaded → ChangesFetched ─┬─► NoOp
//!                                       └─► PayloadBuilt → Published → CursorAdvanced
//! ```
//!
//! Any error before the cursor write leaves the stored cursor exactly as the
//! run found it, so the next run fetches the same changes again
//! (at-least-once delivery). The cursor is written only after the sink
//! acknowledged the batch.
//!
//! # Re-entrancy
//!
//! Runs may overlap. Two runs that read the same cursor fetch and publish the
//! same batch and then write the same target cursor: the sink sees duplicates,
//! nothing is lost, and the stored cursor ends up at the shared target. The
//! engine holds no lock across runs; mutual exclusion, if wanted, belongs to
//! whatever schedules the runs.
//!
//! # Failure after delivery
//!
//! If publishing succeeds but the cursor write fails, the run reports an
//! [`SyncStep::AdvanceCursor`] failure. The batch will be delivered again by
//! the next run. Duplicates are preferred over losing track of a delivery.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use checkpoint::CursorStore;
use forward_types::{build_payload, upserted_streams, Cursor, ObservationPolicy, OutputRecord};
use stream_forward_feed_source::{ChangeFeed, MetadataResolver};
use stream_forward_sink::Sink;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Settings for one forwarder instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// External id of the change subscription to read.
    pub subscription: String,
    /// Key under which the cursor for `subscription` is stored.
    pub state_key: String,
    /// Upper bound for each collaborator call made during a run.
    pub call_timeout: Duration,
    pub observation_policy: ObservationPolicy,
    /// Build the payload but neither publish it nor advance the cursor.
    pub dry_run: bool,
}

impl SyncConfig {
    pub fn new(subscription: impl Into<String>, state_key: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            state_key: state_key.into(),
            call_timeout: Duration::from_secs(300),
            observation_policy: ObservationPolicy::default(),
            dry_run: false,
        }
    }
}

/// Step of a run, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStep {
    LoadCursor,
    FetchChanges,
    ResolveMetadata,
    BuildPayload,
    Publish,
    AdvanceCursor,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::LoadCursor => "load cursor",
            SyncStep::FetchChanges => "fetch changes",
            SyncStep::ResolveMetadata => "resolve metadata",
            SyncStep::BuildPayload => "build payload",
            SyncStep::Publish => "publish",
            SyncStep::AdvanceCursor => "advance cursor",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed")]
pub struct SyncError {
    pub step: SyncStep,
    #[source]
    pub source: anyhow::Error,
}

impl SyncError {
    pub fn new(step: SyncStep, source: impl Into<anyhow::Error>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

/// Terminal state of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No changes since the stored cursor. Nothing was written anywhere.
    NoOp { cursor: Option<Cursor> },
    /// The batch was delivered (or had nothing to deliver) and the cursor
    /// now points past it.
    CursorAdvanced {
        /// Change records fetched
        records: usize,
        /// Output records delivered to the sink
        published: usize,
        cursor: Cursor,
    },
    /// Dry run: the batch was built but not delivered.
    DryRun {
        records: usize,
        /// The batch that would have been published
        batch: Vec<OutputRecord>,
        /// Cursor the run would have advanced to
        cursor: Cursor,
    },
}

/// Orchestrates cursor store, change feed, metadata, payload builder and sink
/// into one idempotent run.
pub struct SyncEngine<C, F, M, S> {
    config: SyncConfig,
    cursors: C,
    feed: F,
    metadata: M,
    sink: S,
}

impl<C, F, M, S> SyncEngine<C, F, M, S>
where
    C: CursorStore,
    F: ChangeFeed,
    M: MetadataResolver,
    S: Sink,
{
    pub fn new(config: SyncConfig, cursors: C, feed: F, metadata: M, sink: S) -> Self {
        Self {
            config,
            cursors,
            feed,
            metadata,
            sink,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Perform one forwarding run.
    pub async fn run(&self) -> Result<RunOutcome, SyncError> {
        let span = info_span!(
            "sync_run",
            subscription = %self.config.subscription,
            state_key = %self.config.state_key
        );

        async {
            let result = self.run_steps().await;
            if let Err(e) = &result {
                error!("Run failed at {}: {:#}", e.step, e.source);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self) -> Result<RunOutcome, SyncError> {
        let state_key = self.config.state_key.as_str();

        let stored = self
            .step(SyncStep::LoadCursor, self.cursors.read_cursor(state_key))
            .await?;
        let cursor = stored.map(|s| s.cursor);
        match &cursor {
            Some(c) => debug!("Loaded cursor {}", c),
            None => info!("No stored cursor, reading subscription from its origin"),
        }

        let batch = self
            .step(
                SyncStep::FetchChanges,
                self.feed
                    .fetch_changes(&self.config.subscription, cursor.as_ref()),
            )
            .await?;

        if batch.records.is_empty() {
            info!("Caught up, nothing to forward");
            return Ok(RunOutcome::NoOp { cursor });
        }
        debug!("Fetched {} change records", batch.records.len());

        let streams = upserted_streams(&batch.records);
        let metadata = self
            .step(SyncStep::ResolveMetadata, self.metadata.resolve(&streams))
            .await?;

        let payload = build_payload(&batch.records, &metadata, self.config.observation_policy)
            .map_err(|e| SyncError::new(SyncStep::BuildPayload, e))?;
        if payload.dropped_observations > 0 {
            warn!(
                "{} observations beyond the first of their change record were not forwarded",
                payload.dropped_observations
            );
        }

        if self.config.dry_run {
            info!(
                "Dry run: built {} records from {} changes; not publishing, cursor stays at {}",
                payload.len(),
                batch.records.len(),
                cursor.as_ref().map(Cursor::as_str).unwrap_or("<origin>")
            );
            for record in &payload.records {
                debug!("Dry run record: {:?}", record);
            }
            return Ok(RunOutcome::DryRun {
                records: batch.records.len(),
                batch: payload.records,
                cursor: batch.cursor,
            });
        }

        if payload.is_empty() {
            info!(
                "No upserts among {} changes, nothing to publish",
                batch.records.len()
            );
        } else {
            self.step(SyncStep::Publish, self.sink.publish(&payload.records))
                .await?;
            debug!("Sink accepted {} records", payload.len());
        }

        if let Err(e) = self
            .step(
                SyncStep::AdvanceCursor,
                self.cursors.store_cursor(state_key, &batch.cursor),
            )
            .await
        {
            warn!(
                "{} records were delivered but the cursor was not advanced; the next run will deliver them again",
                payload.len()
            );
            return Err(e);
        }

        info!(
            "Forwarded {} records from {} changes, cursor advanced to {}",
            payload.len(),
            batch.records.len(),
            batch.cursor
        );
        Ok(RunOutcome::CursorAdvanced {
            records: batch.records.len(),
            published: payload.len(),
            cursor: batch.cursor,
        })
    }

    /// Await one collaborator call under the configured timeout.
    async fn step<T>(
        &self,
        step: SyncStep,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, SyncError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SyncError::new(step, e)),
            Err(_) => Err(SyncError::new(
                step,
                anyhow::anyhow!("timed out after {:?}", self.config.call_timeout),
            )),
        }
    }
}
