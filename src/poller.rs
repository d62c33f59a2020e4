//! Per-device poll loops.
//!
//! Each configured endpoint gets its own task running
//! fetch → normalize → write → sleep forever. A failure at any stage ends
//! only the current cycle: it is logged with its stage and the task goes
//! straight to sleeping. Tasks share nothing but the fetcher and writer
//! handles, so a stalled device delays only itself.
//!
//! Cancellation is observed at cycle boundaries (before fetching and while
//! sleeping); an in-flight fetch or transaction always runs to completion.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::{normalize, split_sources, DeviceEndpoint, Fetch, FetchError, NormalizeError};
use crate::{NormalizedBatch, WriteError, WriteResult};

// ---

/// Durable sink for normalized batches.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    async fn write(&self, batch: &NormalizedBatch) -> Result<WriteResult, WriteError>;
}

/// Why one cycle (or one source within it) produced no data.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl CycleError {
    /// Pipeline stage that failed, for log context.
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "fetch",
            CycleError::Normalize(_) => "normalize",
            CycleError::Write(_) => "write",
        }
    }
}

/// Result of one cycle whose fetch succeeded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    // ---
    pub written: usize,
    pub failed: usize,
}

/// Spawn one independent poll loop per endpoint.
///
/// The returned set owns the tasks; dropping it aborts them. For a clean
/// stop, cancel `cancel` and drain the set.
pub fn spawn_pollers<F, W>(
    endpoints: &[DeviceEndpoint],
    fetcher: Arc<F>,
    writer: Arc<W>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinSet<()>
where
    F: Fetch + ?Sized + 'static,
    W: BatchWriter + ?Sized + 'static,
{
    // ---
    let mut tasks = JoinSet::new();

    for endpoint in endpoints {
        let span = tracing::info_span!("poller", endpoint = %endpoint);
        tasks.spawn(
            poll_device(
                endpoint.to_string(),
                endpoint.status_url(),
                Arc::clone(&fetcher),
                Arc::clone(&writer),
                interval,
                cancel.clone(),
            )
            .instrument(span),
        );
    }

    info!("Started {} poller(s), interval {:?}", endpoints.len(), interval);
    tasks
}

/// Poll `url` until `cancel` fires.
pub async fn poll_device<F, W>(
    source: String,
    url: String,
    fetcher: Arc<F>,
    writer: Arc<W>,
    interval: Duration,
    cancel: CancellationToken,
) where
    F: Fetch + ?Sized,
    W: BatchWriter + ?Sized,
{
    // ---
    let mut failing = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match run_cycle(&source, &url, fetcher.as_ref(), writer.as_ref()).await {
            Ok(outcome) if outcome.failed == 0 => {
                if failing {
                    info!(endpoint = %source, "Device recovered");
                    failing = false;
                }
            }
            Ok(_) => failing = true,
            Err(e) => {
                warn!(endpoint = %source, stage = e.stage(), error = %e, "Poll cycle failed");
                failing = true;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!(endpoint = %source, "Poller stopped");
}

/// One fetch followed by a normalize and write per contained source.
///
/// Only a failed fetch is an error; per-source failures are logged here and
/// counted, so one bad device behind a shared endpoint spares the others.
pub async fn run_cycle<F, W>(
    source: &str,
    url: &str,
    fetcher: &F,
    writer: &W,
) -> Result<CycleOutcome, CycleError>
where
    F: Fetch + ?Sized,
    W: BatchWriter + ?Sized,
{
    // ---
    let raw = fetcher.fetch(url).await?;
    let mut outcome = CycleOutcome::default();

    for (origin, payload) in split_sources(source, raw) {
        match ingest(&payload, writer).await {
            Ok(result) => {
                debug!(
                    endpoint = %origin,
                    device_id = result.device_id.0,
                    readings = result.readings,
                    analog = result.analog,
                    switches = result.switches,
                    internal_relays = result.internal_relays,
                    external_relays = result.external_relays,
                    power = result.power,
                    debug_snapshots = result.debug,
                    "Cycle committed"
                );
                outcome.written += 1;
            }
            Err(e) => {
                warn!(endpoint = %origin, stage = e.stage(), error = %e, "Poll cycle failed");
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

async fn ingest<W>(payload: &Value, writer: &W) -> Result<WriteResult, CycleError>
where
    W: BatchWriter + ?Sized,
{
    let batch = normalize(payload, Utc::now())?;
    Ok(writer.write(&batch).await?)
}
