//! Database models mapping to the catalog schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Catalog object record: the stable identity assigned to a storage key.
#[derive(Debug, Clone, FromRow)]
pub struct ObjectRow {
    pub id: Uuid,
    pub path: String,
    pub bucket_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Catalog version record mirroring one storage version of a key.
///
/// `s3_version_id = None` is the synthetic row for an unversioned bucket
/// (at most one per object).
#[derive(Debug, Clone, FromRow)]
pub struct VersionRow {
    pub id: Uuid,
    pub object_id: Uuid,
    pub s3_version_id: Option<String>,
    pub etag: Option<String>,
    pub mime_type: Option<String>,
    pub is_latest: bool,
    pub delete_marker: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Pending reconciliation job.
///
/// Deletion from the queue table is completion; there is no "done" state.
#[derive(Debug, Clone, FromRow)]
pub struct QueueJobRow {
    pub id: i64,
    pub bucket_id: Uuid,
    pub path: String,
    #[sqlx(rename = "full_sync")]
    pub full: bool,
    pub retries: i32,
    pub created_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Job submission: the unique key of a queue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub bucket_id: Uuid,
    pub path: String,
}

impl NewJob {
    pub fn new(bucket_id: Uuid, path: impl Into<String>) -> Self {
        Self {
            bucket_id,
            path: path.into(),
        }
    }
}
