//! Catalog store trait and SQLite implementation.

use crate::error::CatalogResult;
use crate::models::{NewJob, ObjectRow, QueueJobRow, VersionRow};
use crate::repos::queue::ENQUEUE_PARAMS_PER_ROW;
use crate::repos::{MetadataRepo, ObjectRepo, QueueRepo, TagRepo, VersionRepo};
use async_trait::async_trait;
use coms_core::KvPair;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Combined catalog store trait.
///
/// Queue operations live at the pool level (each manages its own
/// transaction); row operations live on a [`CatalogTx`] so a full sync pass
/// commits or rolls back as one unit.
#[async_trait]
pub trait CatalogStore: QueueRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> CatalogResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> CatalogResult<()>;

    /// Begin a catalog transaction. Dropping the value without `commit`
    /// rolls back.
    async fn begin(&self) -> CatalogResult<Box<dyn CatalogTx>>;
}

/// A live catalog transaction carrying all row operations.
#[async_trait]
pub trait CatalogTx: ObjectRepo + VersionRepo + TagRepo + MetadataRepo + Send {
    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> CatalogResult<()>;

    /// Roll back the transaction explicitly.
    async fn rollback(self: Box<Self>) -> CatalogResult<()>;
}

/// SQLite bind-parameter ceiling (SQLITE_MAX_VARIABLE_NUMBER).
const SQLITE_BIND_LIMIT: usize = 32766;

/// SQLite-based catalog store.
///
/// Suitable for testing and single-process deployments; the single-connection
/// pool serializes writers, which is also what makes its dequeue claim safe.
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    /// Create a new SQLite catalog, creating the database file if missing.
    pub async fn new(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures and serializes
            // dequeue claims.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn migrate(&self) -> CatalogResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> CatalogResult<Box<dyn CatalogTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteCatalogTx { tx }))
    }
}

#[async_trait]
impl QueueRepo for SqliteCatalog {
    async fn enqueue(
        &self,
        jobs: &[NewJob],
        full: bool,
        retries: i32,
        created_by: Option<Uuid>,
    ) -> CatalogResult<u64> {
        if jobs.iter().any(|job| job.path.trim().is_empty()) {
            tracing::warn!("rejecting enqueue batch: job with empty path");
            return Ok(0);
        }

        let chunk_size = SQLITE_BIND_LIMIT / ENQUEUE_PARAMS_PER_ROW;
        let now = OffsetDateTime::now_utc();
        let mut inserted = 0u64;
        for chunk in jobs.chunks(chunk_size) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO queue (bucket_id, path, full_sync, retries, created_by, created_at) ",
            );
            qb.push_values(chunk.iter(), |mut b, job| {
                b.push_bind(job.bucket_id)
                    .push_bind(job.path.as_str())
                    .push_bind(full)
                    .push_bind(retries)
                    .push_bind(created_by)
                    .push_bind(now);
            });
            qb.push(" ON CONFLICT (bucket_id, path) DO NOTHING");
            let result = qb.build().execute(&self.pool).await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn dequeue(&self) -> CatalogResult<Option<QueueJobRow>> {
        // Single-statement claim-and-delete; the single-connection pool
        // serializes concurrent callers so a row is handed out once.
        let job = sqlx::query_as::<_, QueueJobRow>(
            "DELETE FROM queue WHERE id = (SELECT id FROM queue ORDER BY id LIMIT 1) RETURNING *",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn queue_size(&self, bucket_ids: Option<&[Uuid]>) -> CatalogResult<u64> {
        let count: i64 = match bucket_ids {
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM queue")
                    .fetch_one(&self.pool)
                    .await?
            }
            Some([]) => 0,
            Some(ids) => {
                let mut qb: QueryBuilder<Sqlite> =
                    QueryBuilder::new("SELECT COUNT(*) FROM queue WHERE bucket_id IN (");
                let mut separated = qb.separated(", ");
                for id in ids {
                    separated.push_bind(*id);
                }
                qb.push(")");
                qb.build_query_scalar().fetch_one(&self.pool).await?
            }
        };
        Ok(count as u64)
    }
}

/// SQLite catalog transaction.
pub struct SqliteCatalogTx {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl CatalogTx for SqliteCatalogTx {
    async fn commit(self: Box<Self>) -> CatalogResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CatalogResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectRepo for SqliteCatalogTx {
    async fn get_object(
        &mut self,
        bucket_id: Uuid,
        path: &str,
    ) -> CatalogResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>(
            "SELECT * FROM object WHERE bucket_id = ? AND path = ?",
        )
        .bind(bucket_id)
        .bind(path)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn get_object_by_id(&mut self, id: Uuid) -> CatalogResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>("SELECT * FROM object WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_object(&mut self, object: &ObjectRow) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO object (id, path, bucket_id, created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(object.id)
        .bind(&object.path)
        .bind(object.bucket_id)
        .bind(object.created_by)
        .bind(object.created_at)
        .bind(object.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_object(&mut self, id: Uuid) -> CatalogResult<()> {
        sqlx::query("DELETE FROM object WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VersionRepo for SqliteCatalogTx {
    async fn list_versions(&mut self, object_id: Uuid) -> CatalogResult<Vec<VersionRow>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM version WHERE object_id = ? ORDER BY created_at, id",
        )
        .bind(object_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows)
    }

    async fn insert_version(&mut self, version: &VersionRow) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO version \
             (id, object_id, s3_version_id, etag, mime_type, is_latest, delete_marker, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(version.id)
        .bind(version.object_id)
        .bind(&version.s3_version_id)
        .bind(&version.etag)
        .bind(&version.mime_type)
        .bind(version.is_latest)
        .bind(version.delete_marker)
        .bind(version.created_at)
        .bind(version.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_version(&mut self, id: Uuid) -> CatalogResult<()> {
        sqlx::query("DELETE FROM version WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_version_content(
        &mut self,
        id: Uuid,
        etag: Option<&str>,
        mime_type: Option<&str>,
    ) -> CatalogResult<()> {
        sqlx::query("UPDATE version SET etag = ?, mime_type = ?, updated_at = ? WHERE id = ?")
            .bind(etag)
            .bind(mime_type)
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_latest_version(
        &mut self,
        object_id: Uuid,
        version_id: Option<Uuid>,
    ) -> CatalogResult<()> {
        match version_id {
            Some(id) => {
                sqlx::query("UPDATE version SET is_latest = (id = ?) WHERE object_id = ?")
                    .bind(id)
                    .bind(object_id)
                    .execute(&mut *self.tx)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE version SET is_latest = 0 WHERE object_id = ?")
                    .bind(object_id)
                    .execute(&mut *self.tx)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TagRepo for SqliteCatalogTx {
    async fn list_version_tags(&mut self, version_id: Uuid) -> CatalogResult<Vec<KvPair>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT t.key, t.value FROM tag t \
             INNER JOIN version_tag vt ON vt.tag_id = t.id \
             WHERE vt.version_id = ? ORDER BY t.key, t.value",
        )
        .bind(version_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(key, value)| KvPair { key, value })
            .collect())
    }

    async fn associate_tags(&mut self, version_id: Uuid, pairs: &[KvPair]) -> CatalogResult<()> {
        for pair in pairs {
            sqlx::query("INSERT INTO tag (key, value) VALUES (?, ?) ON CONFLICT (key, value) DO NOTHING")
                .bind(&pair.key)
                .bind(&pair.value)
                .execute(&mut *self.tx)
                .await?;
            let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tag WHERE key = ? AND value = ?")
                .bind(&pair.key)
                .bind(&pair.value)
                .fetch_one(&mut *self.tx)
                .await?;
            sqlx::query(
                "INSERT INTO version_tag (version_id, tag_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(version_id)
            .bind(tag_id)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn dissociate_tags(&mut self, version_id: Uuid, pairs: &[KvPair]) -> CatalogResult<()> {
        for pair in pairs {
            sqlx::query(
                "DELETE FROM version_tag WHERE version_id = ? \
                 AND tag_id IN (SELECT id FROM tag WHERE key = ? AND value = ?)",
            )
            .bind(version_id)
            .bind(&pair.key)
            .bind(&pair.value)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn prune_orphan_tags(&mut self) -> CatalogResult<u64> {
        let result = sqlx::query(
            "DELETE FROM tag WHERE id NOT IN (SELECT DISTINCT tag_id FROM version_tag)",
        )
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MetadataRepo for SqliteCatalogTx {
    async fn list_version_metadata(&mut self, version_id: Uuid) -> CatalogResult<Vec<KvPair>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT m.key, m.value FROM metadata m \
             INNER JOIN version_metadata vm ON vm.metadata_id = m.id \
             WHERE vm.version_id = ? ORDER BY m.key, m.value",
        )
        .bind(version_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(key, value)| KvPair { key, value })
            .collect())
    }

    async fn associate_metadata(
        &mut self,
        version_id: Uuid,
        pairs: &[KvPair],
    ) -> CatalogResult<()> {
        for pair in pairs {
            sqlx::query(
                "INSERT INTO metadata (key, value) VALUES (?, ?) ON CONFLICT (key, value) DO NOTHING",
            )
            .bind(&pair.key)
            .bind(&pair.value)
            .execute(&mut *self.tx)
            .await?;
            let metadata_id: i64 =
                sqlx::query_scalar("SELECT id FROM metadata WHERE key = ? AND value = ?")
                    .bind(&pair.key)
                    .bind(&pair.value)
                    .fetch_one(&mut *self.tx)
                    .await?;
            sqlx::query(
                "INSERT INTO version_metadata (version_id, metadata_id) VALUES (?, ?) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(version_id)
            .bind(metadata_id)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn dissociate_metadata(
        &mut self,
        version_id: Uuid,
        pairs: &[KvPair],
    ) -> CatalogResult<()> {
        for pair in pairs {
            sqlx::query(
                "DELETE FROM version_metadata WHERE version_id = ? \
                 AND metadata_id IN (SELECT id FROM metadata WHERE key = ? AND value = ?)",
            )
            .bind(version_id)
            .bind(&pair.key)
            .bind(&pair.value)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn prune_orphan_metadata(&mut self) -> CatalogResult<u64> {
        let result = sqlx::query(
            "DELETE FROM metadata WHERE id NOT IN (SELECT DISTINCT metadata_id FROM version_metadata)",
        )
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }
}

/// SQLite schema (embedded).
const SCHEMA_SQL: &str = r#"
-- Catalog objects: stable identity per (bucket, path) key.
CREATE TABLE IF NOT EXISTS object (
    id BLOB PRIMARY KEY,
    path TEXT NOT NULL,
    bucket_id BLOB NOT NULL,
    created_by BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_object_bucket_path ON object(bucket_id, path);

-- Catalog versions mirroring storage version history.
CREATE TABLE IF NOT EXISTS version (
    id BLOB PRIMARY KEY,
    object_id BLOB NOT NULL REFERENCES object(id) ON DELETE CASCADE,
    s3_version_id TEXT,
    etag TEXT,
    mime_type TEXT,
    is_latest INTEGER NOT NULL DEFAULT 0,
    delete_marker INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_version_object ON version(object_id);
CREATE INDEX IF NOT EXISTS idx_version_s3_version ON version(object_id, s3_version_id);

-- Tags, deduplicated by (key, value), joined to versions.
CREATE TABLE IF NOT EXISTS tag (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tag_key_value ON tag(key, value);

CREATE TABLE IF NOT EXISTS version_tag (
    version_id BLOB NOT NULL REFERENCES version(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
    PRIMARY KEY (version_id, tag_id)
);

-- User metadata, same shape as tags.
CREATE TABLE IF NOT EXISTS metadata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_metadata_key_value ON metadata(key, value);

CREATE TABLE IF NOT EXISTS version_metadata (
    version_id BLOB NOT NULL REFERENCES version(id) ON DELETE CASCADE,
    metadata_id INTEGER NOT NULL REFERENCES metadata(id) ON DELETE CASCADE,
    PRIMARY KEY (version_id, metadata_id)
);

-- Pending sync jobs. Row deletion is job completion.
CREATE TABLE IF NOT EXISTS queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket_id BLOB NOT NULL,
    path TEXT NOT NULL,
    full_sync INTEGER NOT NULL DEFAULT 0,
    retries INTEGER NOT NULL DEFAULT 0,
    created_by BLOB,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_bucket_path ON queue(bucket_id, path);
"#;
