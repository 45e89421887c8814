//! Deterministic in-memory storage backend.
//!
//! Models versioned and unversioned buckets with delete markers, per-version
//! tag sets and user metadata. Used by tests and local development; the
//! seeding helpers mutate the store the way out-of-band S3 traffic would.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStorage;
use crate::types::{ObjectHead, VersionEntry, VersionListing};
use async_trait::async_trait;
use coms_core::{KvPair, STORAGE_TAG_LIMIT};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct StoredVersion {
    version_id: Option<String>,
    etag: Option<String>,
    mime_type: Option<String>,
    delete_marker: bool,
    tags: Vec<KvPair>,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct BucketState {
    versioned: bool,
    // Version stacks per key; the last entry is the latest.
    keys: HashMap<String, Vec<StoredVersion>>,
    counter: u64,
}

impl BucketState {
    fn next_version_id(&mut self) -> String {
        self.counter += 1;
        format!("v{:06}", self.counter)
    }
}

/// In-memory object store keyed by catalog bucket id.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Mutex<HashMap<Uuid, BucketState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket as versioned or unversioned.
    pub async fn create_bucket(&self, bucket_id: Uuid, versioned: bool) {
        let mut buckets = self.buckets.lock().await;
        buckets.entry(bucket_id).or_default().versioned = versioned;
    }

    /// Put a new object version; returns the assigned version id
    /// (None for unversioned buckets, where the put replaces the key).
    pub async fn put_object(
        &self,
        bucket_id: Uuid,
        key: &str,
        etag: &str,
        mime_type: &str,
        metadata: HashMap<String, String>,
    ) -> Option<String> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(bucket_id).or_default();
        let version_id = bucket.versioned.then(|| bucket.next_version_id());
        let version = StoredVersion {
            version_id: version_id.clone(),
            etag: Some(etag.to_string()),
            mime_type: Some(mime_type.to_string()),
            delete_marker: false,
            tags: Vec::new(),
            metadata,
        };
        let stack = bucket.keys.entry(key.to_string()).or_default();
        if bucket.versioned {
            stack.push(version);
        } else {
            *stack = vec![version];
        }
        version_id
    }

    /// Delete a key the way the S3 API does: versioned buckets gain a delete
    /// marker, unversioned buckets drop the key outright.
    pub async fn delete_object(&self, bucket_id: Uuid, key: &str) -> Option<String> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(bucket_id).or_default();
        if bucket.versioned {
            let marker_id = bucket.next_version_id();
            let stack = bucket.keys.entry(key.to_string()).or_default();
            stack.push(StoredVersion {
                version_id: Some(marker_id.clone()),
                etag: None,
                mime_type: None,
                delete_marker: true,
                tags: Vec::new(),
                metadata: HashMap::new(),
            });
            Some(marker_id)
        } else {
            bucket.keys.remove(key);
            None
        }
    }

    /// Permanently remove one version (lifecycle expiry, versioned delete).
    pub async fn remove_version(&self, bucket_id: Uuid, key: &str, version_id: &str) {
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get_mut(&bucket_id) {
            if let Some(stack) = bucket.keys.get_mut(key) {
                stack.retain(|v| v.version_id.as_deref() != Some(version_id));
                if stack.is_empty() {
                    bucket.keys.remove(key);
                }
            }
        }
    }

    /// Seed a version's tag set directly, bypassing the tag ceiling.
    pub async fn set_tags(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
        tags: Vec<KvPair>,
    ) {
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get_mut(&bucket_id) {
            if let Some(stack) = bucket.keys.get_mut(key) {
                if let Some(version) = resolve_mut(stack, version_id) {
                    version.tags = tags;
                }
            }
        }
    }
}

fn resolve<'a>(
    stack: &'a [StoredVersion],
    version_id: Option<&str>,
) -> Option<&'a StoredVersion> {
    match version_id {
        Some(id) => stack.iter().find(|v| v.version_id.as_deref() == Some(id)),
        None => stack.last(),
    }
}

fn resolve_mut<'a>(
    stack: &'a mut [StoredVersion],
    version_id: Option<&str>,
) -> Option<&'a mut StoredVersion> {
    match version_id {
        Some(id) => stack
            .iter_mut()
            .find(|v| v.version_id.as_deref() == Some(id)),
        None => stack.last_mut(),
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn head_object(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<Option<ObjectHead>> {
        let buckets = self.buckets.lock().await;
        let bucket = buckets
            .get(&bucket_id)
            .ok_or_else(|| StorageError::UnknownBucket(bucket_id.to_string()))?;
        let Some(stack) = bucket.keys.get(key) else {
            return Ok(None);
        };
        Ok(resolve(stack, version_id).map(|version| ObjectHead {
            etag: version.etag.clone(),
            mime_type: version.mime_type.clone(),
            delete_marker: version.delete_marker,
            version_id: version.version_id.clone(),
            metadata: version.metadata.clone(),
        }))
    }

    async fn list_object_versions(
        &self,
        bucket_id: Uuid,
        key: &str,
    ) -> StorageResult<VersionListing> {
        let buckets = self.buckets.lock().await;
        let bucket = buckets
            .get(&bucket_id)
            .ok_or_else(|| StorageError::UnknownBucket(bucket_id.to_string()))?;
        let mut listing = VersionListing::default();
        let Some(stack) = bucket.keys.get(key) else {
            return Ok(listing);
        };
        let last = stack.len().saturating_sub(1);
        for (index, version) in stack.iter().enumerate() {
            let entry = VersionEntry {
                version_id: version.version_id.clone(),
                etag: version.etag.clone(),
                is_latest: index == last,
            };
            if version.delete_marker {
                listing.delete_markers.push(entry);
            } else {
                listing.versions.push(entry);
            }
        }
        Ok(listing)
    }

    async fn get_object_tagging(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<Vec<KvPair>> {
        let buckets = self.buckets.lock().await;
        let bucket = buckets
            .get(&bucket_id)
            .ok_or_else(|| StorageError::UnknownBucket(bucket_id.to_string()))?;
        let version = bucket
            .keys
            .get(key)
            .and_then(|stack| resolve(stack, version_id))
            .ok_or_else(|| StorageError::NotFound(format!("{bucket_id}/{key}")))?;
        Ok(version.tags.clone())
    }

    async fn put_object_tagging(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
        tags: &[KvPair],
    ) -> StorageResult<()> {
        if tags.len() > STORAGE_TAG_LIMIT {
            return Err(StorageError::TagLimitExceeded {
                count: tags.len(),
                max: STORAGE_TAG_LIMIT,
            });
        }
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .get_mut(&bucket_id)
            .ok_or_else(|| StorageError::UnknownBucket(bucket_id.to_string()))?;
        let version = bucket
            .keys
            .get_mut(key)
            .and_then(|stack| resolve_mut(stack, version_id))
            .ok_or_else(|| StorageError::NotFound(format!("{bucket_id}/{key}")))?;
        version.tags = tags.to_vec();
        Ok(())
    }
}
