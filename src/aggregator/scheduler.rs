// ABOUTME: Scheduling hooks deciding when a requested rebuild runs
// ABOUTME: Inline execution by default, or a coalescing background worker

use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::BuildReport;
use crate::error::{Result, SyncError};

/// A pending rebuild of every queued id.
pub type BuildFuture = BoxFuture<'static, Result<BuildReport>>;

/// Decides when a rebuild requested by an event actually runs.
///
/// Rebuilds only remove the ids they processed, so overlapping runs never
/// lose ids, but one batch may then be delivered twice. Schedulers that run
/// builds concurrently must coordinate that themselves.
#[async_trait]
pub trait BuildScheduler: Send + Sync {
    async fn schedule(&self, build: BuildFuture) -> Result<()>;
}

/// Runs the rebuild in place; the event call returns once it has finished
/// and surfaces its error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

#[async_trait]
impl BuildScheduler for ImmediateScheduler {
    async fn schedule(&self, build: BuildFuture) -> Result<()> {
        let report = build.await?;
        tracing::trace!(?report, "Inline rebuild finished");
        Ok(())
    }
}

/// Runs rebuilds one at a time on a background task.
///
/// Requests made while a rebuild is running are coalesced into a single
/// follow-up run, which picks up every id queued in the meantime. Failed
/// rebuilds are logged and their ids stay pending for the next run.
pub struct BackgroundScheduler {
    requests: Mutex<Option<mpsc::Sender<BuildFuture>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    pub fn spawn() -> Self {
        // One queued rebuild covers any number of requests behind it.
        let (requests, mut pending) = mpsc::channel::<BuildFuture>(1);
        let worker = tokio::spawn(async move {
            while let Some(build) = pending.recv().await {
                match build.await {
                    Ok(report) => tracing::debug!(
                        batches = report.batches,
                        upserted = report.upserted,
                        deleted = report.deleted,
                        "Background rebuild finished"
                    ),
                    Err(e) => tracing::error!("Background rebuild failed: {}", e),
                }
            }
        });
        Self {
            requests: Mutex::new(Some(requests)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stops accepting requests and waits for the queued rebuild to finish.
    pub async fn shutdown(&self) -> Result<()> {
        let requests = self.requests.lock().map_err(|_| poisoned())?.take();
        drop(requests);

        let worker = self.worker.lock().map_err(|_| poisoned())?.take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| SyncError::Scheduler(anyhow!("rebuild worker panicked: {}", e)))?;
        }
        Ok(())
    }
}

fn poisoned() -> SyncError {
    SyncError::Scheduler(anyhow!("scheduler lock poisoned"))
}

#[async_trait]
impl BuildScheduler for BackgroundScheduler {
    async fn schedule(&self, build: BuildFuture) -> Result<()> {
        let requests = self.requests.lock().map_err(|_| poisoned())?;
        let Some(requests) = requests.as_ref() else {
            return Err(SyncError::Scheduler(anyhow!("scheduler has been shut down")));
        };
        match requests.try_send(build) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SyncError::Scheduler(anyhow!("rebuild worker has stopped")))
            }
        }
    }
}
