//! PostgreSQL-based catalog store implementation.

use crate::error::CatalogResult;
use crate::models::{NewJob, ObjectRow, QueueJobRow, VersionRow};
use crate::repos::queue::ENQUEUE_PARAMS_PER_ROW;
use crate::repos::{MetadataRepo, ObjectRepo, QueueRepo, TagRepo, VersionRepo};
use crate::store::{CatalogStore, CatalogTx};
use async_trait::async_trait;
use coms_core::KvPair;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// PostgreSQL bind-parameter ceiling (u16 parameter index).
const POSTGRES_BIND_LIMIT: usize = 65535;

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based catalog store.
pub struct PostgresCatalog {
    pool: Pool<Postgres>,
}

impl PostgresCatalog {
    /// Create a new PostgreSQL catalog from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> CatalogResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;

        // Bound hung queries so a stuck reconciliation transaction cannot
        // hold the worker forever.
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalog {
    async fn migrate(&self) -> CatalogResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared
        // statement, so the schema executes statement by statement.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> CatalogResult<Box<dyn CatalogTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresCatalogTx { tx }))
    }
}

#[async_trait]
impl QueueRepo for PostgresCatalog {
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

        let chunk_size = POSTGRES_BIND_LIMIT / ENQUEUE_PARAMS_PER_ROW;
        let now = OffsetDateTime::now_utc();
        let mut inserted = 0u64;
        for chunk in jobs.chunks(chunk_size) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
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
        // Claim-and-delete in one transaction. SKIP LOCKED makes rows held
        // by concurrent dequeuers invisible instead of blocking, so
        // contending workers never double-claim and never wait.
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, QueueJobRow>(
            "SELECT * FROM queue ORDER BY id LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ref claimed) = job {
            sqlx::query("DELETE FROM queue WHERE id = $1")
                .bind(claimed.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
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
                sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE bucket_id = ANY($1)")
                    .bind(ids)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count as u64)
    }
}

/// PostgreSQL catalog transaction.
pub struct PostgresCatalogTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTx for PostgresCatalogTx {
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
impl ObjectRepo for PostgresCatalogTx {
    async fn get_object(
        &mut self,
        bucket_id: Uuid,
        path: &str,
    ) -> CatalogResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>(
            "SELECT * FROM object WHERE bucket_id = $1 AND path = $2",
        )
        .bind(bucket_id)
        .bind(path)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn get_object_by_id(&mut self, id: Uuid) -> CatalogResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>("SELECT * FROM object WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_object(&mut self, object: &ObjectRow) -> CatalogResult<()> {
        sqlx::query(
            "INSERT INTO object (id, path, bucket_id, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
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
        sqlx::query("DELETE FROM object WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VersionRepo for PostgresCatalogTx {
    async fn list_versions(&mut self, object_id: Uuid) -> CatalogResult<Vec<VersionRow>> {
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM version WHERE object_id = $1 ORDER BY created_at, id",
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
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
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
        sqlx::query("DELETE FROM version WHERE id = $1")
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
        sqlx::query("UPDATE version SET etag = $1, mime_type = $2, updated_at = $3 WHERE id = $4")
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
                sqlx::query("UPDATE version SET is_latest = (id = $1) WHERE object_id = $2")
                    .bind(id)
                    .bind(object_id)
                    .execute(&mut *self.tx)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE version SET is_latest = FALSE WHERE object_id = $1")
                    .bind(object_id)
                    .execute(&mut *self.tx)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TagRepo for PostgresCatalogTx {
    async fn list_version_tags(&mut self, version_id: Uuid) -> CatalogResult<Vec<KvPair>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT t.key, t.value FROM tag t \
             INNER JOIN version_tag vt ON vt.tag_id = t.id \
             WHERE vt.version_id = $1 ORDER BY t.key, t.value",
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
            sqlx::query(
                "INSERT INTO tag (key, value) VALUES ($1, $2) ON CONFLICT (key, value) DO NOTHING",
            )
            .bind(&pair.key)
            .bind(&pair.value)
            .execute(&mut *self.tx)
            .await?;
            let tag_id: i64 =
                sqlx::query_scalar("SELECT id FROM tag WHERE key = $1 AND value = $2")
                    .bind(&pair.key)
                    .bind(&pair.value)
                    .fetch_one(&mut *self.tx)
                    .await?;
            sqlx::query(
                "INSERT INTO version_tag (version_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
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
                "DELETE FROM version_tag WHERE version_id = $1 \
                 AND tag_id IN (SELECT id FROM tag WHERE key = $2 AND value = $3)",
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
impl MetadataRepo for PostgresCatalogTx {
    async fn list_version_metadata(&mut self, version_id: Uuid) -> CatalogResult<Vec<KvPair>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT m.key, m.value FROM metadata m \
             INNER JOIN version_metadata vm ON vm.metadata_id = m.id \
             WHERE vm.version_id = $1 ORDER BY m.key, m.value",
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
                "INSERT INTO metadata (key, value) VALUES ($1, $2) \
                 ON CONFLICT (key, value) DO NOTHING",
            )
            .bind(&pair.key)
            .bind(&pair.value)
            .execute(&mut *self.tx)
            .await?;
            let metadata_id: i64 =
                sqlx::query_scalar("SELECT id FROM metadata WHERE key = $1 AND value = $2")
                    .bind(&pair.key)
                    .bind(&pair.value)
                    .fetch_one(&mut *self.tx)
                    .await?;
            sqlx::query(
                "INSERT INTO version_metadata (version_id, metadata_id) VALUES ($1, $2) \
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
                "DELETE FROM version_metadata WHERE version_id = $1 \
                 AND metadata_id IN (SELECT id FROM metadata WHERE key = $2 AND value = $3)",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_statements() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert!(!statements.is_empty());
        assert!(statements.iter().all(|s| !s.trim().is_empty()));
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS object"));
    }
}
