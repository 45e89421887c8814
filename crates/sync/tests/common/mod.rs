//! Shared fixtures: a SQLite catalog in a temp directory plus the in-memory
//! storage backend, wired into an engine and worker.

use coms_catalog::SqliteCatalog;
use coms_storage::{MemoryStorage, ObjectHead, ObjectStorage, StorageError, VersionListing};
use coms_sync::{SyncEngine, SyncWorker};
use async_trait::async_trait;
use coms_core::KvPair;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub struct Harness {
    pub catalog: Arc<SqliteCatalog>,
    pub storage: Arc<MemoryStorage>,
    _dir: TempDir,
}

impl Harness {
    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(self.catalog.clone(), self.storage.clone())
    }

    pub fn worker(&self, max_retries: u32) -> SyncWorker {
        SyncWorker::new(self.catalog.clone(), self.engine(), max_retries)
    }
}

pub async fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let catalog = SqliteCatalog::new(dir.path().join("catalog.db"))
        .await
        .expect("failed to open sqlite catalog");
    Harness {
        catalog: Arc::new(catalog),
        storage: Arc::new(MemoryStorage::new()),
        _dir: dir,
    }
}

/// Storage backend whose every call fails, for exercising the retry path.
pub struct BrokenStorage;

/// Storage wrapper that fails its first N calls, then behaves normally.
/// Models a transient backend outage.
pub struct FlakyStorage {
    inner: Arc<MemoryStorage>,
    failures: AtomicUsize,
}

impl FlakyStorage {
    pub fn new(inner: Arc<MemoryStorage>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }

    fn trip(&self) -> Result<(), StorageError> {
        let consumed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            Err(StorageError::Backend("transient outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStorage for FlakyStorage {
    async fn head_object(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<Option<ObjectHead>, StorageError> {
        self.trip()?;
        self.inner.head_object(bucket_id, key, version_id).await
    }

    async fn list_object_versions(
        &self,
        bucket_id: Uuid,
        key: &str,
    ) -> Result<VersionListing, StorageError> {
        self.trip()?;
        self.inner.list_object_versions(bucket_id, key).await
    }

    async fn get_object_tagging(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
    ) -> Result<Vec<KvPair>, StorageError> {
        self.trip()?;
        self.inner.get_object_tagging(bucket_id, key, version_id).await
    }

    async fn put_object_tagging(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
        tags: &[KvPair],
    ) -> Result<(), StorageError> {
        self.trip()?;
        self.inner
            .put_object_tagging(bucket_id, key, version_id, tags)
            .await
    }
}

#[async_trait]
impl ObjectStorage for BrokenStorage {
    async fn head_object(
        &self,
        _bucket_id: Uuid,
        _key: &str,
        _version_id: Option<&str>,
    ) -> Result<Option<ObjectHead>, StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn list_object_versions(
        &self,
        _bucket_id: Uuid,
        _key: &str,
    ) -> Result<VersionListing, StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn get_object_tagging(
        &self,
        _bucket_id: Uuid,
        _key: &str,
        _version_id: Option<&str>,
    ) -> Result<Vec<KvPair>, StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }

    async fn put_object_tagging(
        &self,
        _bucket_id: Uuid,
        _key: &str,
        _version_id: Option<&str>,
        _tags: &[KvPair],
    ) -> Result<(), StorageError> {
        Err(StorageError::Backend("connection refused".to_string()))
    }
}
