//! Single-flight worker driver walking the job queue.
//!
//! One job is in flight at a time per process; parallelism across jobs is
//! deliberately not attempted so two sync passes never race on the same
//! object's catalog rows. Multiple processes may still share the queue
//! because dequeue claims are exclusive at the database level.

use crate::engine::SyncEngine;
use crate::error::SyncError;
use coms_catalog::{CatalogStore, NewJob, QueueJobRow, QueueRepo};
use coms_core::SyncConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

/// Driver state: Idle (neither flag), Processing (busy), Draining (both),
/// Closed (closing only).
#[derive(Default)]
struct DriverState {
    busy: bool,
    closing: bool,
    drained: Option<oneshot::Sender<()>>,
}

/// The queue-walking worker.
pub struct SyncWorker {
    catalog: Arc<dyn CatalogStore>,
    engine: SyncEngine,
    max_retries: u32,
    state: Mutex<DriverState>,
}

impl SyncWorker {
    pub fn new(catalog: Arc<dyn CatalogStore>, engine: SyncEngine, max_retries: u32) -> Self {
        Self {
            catalog,
            engine,
            max_retries,
            state: Mutex::new(DriverState::default()),
        }
    }

    pub fn from_config(
        catalog: Arc<dyn CatalogStore>,
        engine: SyncEngine,
        config: &SyncConfig,
    ) -> Self {
        Self::new(catalog, engine, config.max_retries)
    }

    /// Poll the queue and drain it if there is pending work.
    ///
    /// No-op while a drain is already running or after `close`. Queue size
    /// check failures are logged and swallowed; polling is best-effort.
    pub async fn check_queue(&self) {
        {
            let state = self.state.lock().await;
            if state.busy || state.closing {
                return;
            }
        }

        let size = match self.catalog.queue_size(None).await {
            Ok(size) => size,
            Err(err) => {
                tracing::warn!(error = %err, "queue size check failed");
                return;
            }
        };
        if size == 0 {
            return;
        }

        if self.begin_processing().await {
            self.process_queue().await;
        }
    }

    /// Transition Idle -> Processing. Returns false when another caller got
    /// there first or the worker is closing.
    async fn begin_processing(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.busy || state.closing {
            return false;
        }
        state.busy = true;
        true
    }

    /// Transition out of Processing. Returns whether a pending drain
    /// notification fired.
    async fn finish_processing(&self) -> bool {
        let mut state = self.state.lock().await;
        state.busy = false;
        if state.closing {
            if let Some(sender) = state.drained.take() {
                let _ = sender.send(());
                return true;
            }
        }
        false
    }

    /// Drain loop: dequeue and run jobs until the queue is empty or the
    /// worker starts closing. Caller must have won `begin_processing`.
    async fn process_queue(&self) {
        loop {
            let job = match self.catalog.dequeue().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "dequeue failed");
                    break;
                }
            };
            self.run_job(job).await;

            if self.state.lock().await.closing {
                break;
            }
        }
        self.finish_processing().await;
    }

    /// Run one job through the engine; failures go to the retry policy.
    async fn run_job(&self, job: QueueJobRow) {
        match self
            .engine
            .sync_job(&job.path, job.bucket_id, job.full, job.created_by)
            .await
        {
            Ok(object_id) => {
                tracing::debug!(
                    bucket_id = %job.bucket_id,
                    path = %job.path,
                    object_id = ?object_id,
                    "job complete",
                );
            }
            Err(err) => self.retry(job, err).await,
        }
    }

    /// Re-enqueue a failed job with an incremented counter, or drop it once
    /// the retry budget is spent. Dequeue already removed the row, so
    /// dropping means simply not re-enqueueing. A failed re-enqueue is
    /// logged and not retried further.
    async fn retry(&self, job: QueueJobRow, err: SyncError) {
        let attempts = job.retries + 1;
        if attempts as u32 > self.max_retries {
            tracing::warn!(
                bucket_id = %job.bucket_id,
                path = %job.path,
                attempts,
                error = %err,
                "dropping job: retry budget exhausted",
            );
            return;
        }

        tracing::warn!(
            bucket_id = %job.bucket_id,
            path = %job.path,
            attempts,
            error = %err,
            "sync failed, re-enqueueing",
        );
        let requeue = self
            .catalog
            .enqueue(
                &[NewJob::new(job.bucket_id, job.path.clone())],
                job.full,
                attempts,
                job.created_by,
            )
            .await;
        if let Err(requeue_err) = requeue {
            tracing::error!(
                bucket_id = %job.bucket_id,
                path = %job.path,
                error = %requeue_err,
                "re-enqueue failed, job lost",
            );
        }
    }

    /// Stop accepting work and wait for any in-flight job to finish.
    ///
    /// No job is abandoned mid-processing and no new job starts once
    /// closing is set. Idempotent; a second close returns once the first
    /// drain completes.
    pub async fn close(&self) {
        let pending = {
            let mut state = self.state.lock().await;
            state.closing = true;
            if state.busy {
                let (sender, receiver) = oneshot::channel();
                state.drained = Some(sender);
                Some(receiver)
            } else {
                None
            }
        };
        if let Some(receiver) = pending {
            let _ = receiver.await;
        }
    }

    /// Poll the queue on an interval until the shutdown signal fires, then
    /// drain and return.
    pub async fn run(&self, interval: Duration, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_queue().await,
                _ = &mut shutdown => {
                    self.close().await;
                    return;
                }
            }
        }
    }
}
