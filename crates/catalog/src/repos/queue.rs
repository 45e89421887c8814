//! Job queue repository.
//!
//! The queue is a catalog table; each operation manages its own transaction
//! at the pool level so multiple worker processes can share it safely.

use crate::error::CatalogResult;
use crate::models::{NewJob, QueueJobRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for the pending sync job queue.
#[async_trait]
pub trait QueueRepo: Send + Sync {
    /// Insert one row per job; a pending row with the same (bucket_id, path)
    /// wins over the new one (no error, no duplicate).
    ///
    /// Returns the count actually inserted. Short-circuits with `Ok(0)` if
    /// any job has an empty path. Large batches are chunked to stay under
    /// the backend's bind-parameter limit; chunks commit independently, so
    /// the operation is not atomic across chunks but the cumulative count
    /// is still meaningful.
    async fn enqueue(
        &self,
        jobs: &[NewJob],
        full: bool,
        retries: i32,
        created_by: Option<Uuid>,
    ) -> CatalogResult<u64>;

    /// Atomically claim and delete the oldest pending job.
    ///
    /// Returns `Ok(None)` when the queue is empty. Concurrent dequeuers
    /// never receive the same row: PostgreSQL uses a `FOR UPDATE SKIP
    /// LOCKED` claim, SQLite a single-statement delete-returning on its
    /// serialized connection.
    async fn dequeue(&self) -> CatalogResult<Option<QueueJobRow>>;

    /// Count pending jobs, optionally filtered by bucket.
    async fn queue_size(&self, bucket_ids: Option<&[Uuid]>) -> CatalogResult<u64>;
}

/// Bind parameters consumed per queue row on insert.
pub const ENQUEUE_PARAMS_PER_ROW: usize = 6;
