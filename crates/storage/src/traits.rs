//! Storage trait definition.

use crate::error::StorageResult;
use crate::types::{ObjectHead, VersionListing};
use async_trait::async_trait;
use coms_core::KvPair;
use uuid::Uuid;

/// Object store abstraction consumed by the reconciliation engine.
///
/// Implementations resolve `bucket_id` (the catalog's bucket UUID) to an
/// actual bucket endpoint and credentials; the engine never sees raw bucket
/// names.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    /// Probe a key (or a specific version of it).
    ///
    /// Returns `Ok(None)` when the key/version does not exist. A key whose
    /// latest version is a delete marker returns a head with
    /// `delete_marker = true`.
    async fn head_object(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<Option<ObjectHead>>;

    /// List the full version history (versions + delete markers) for a key.
    async fn list_object_versions(
        &self,
        bucket_id: Uuid,
        key: &str,
    ) -> StorageResult<VersionListing>;

    /// Get the tag set of a key's version (latest when `version_id` is None).
    async fn get_object_tagging(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<Vec<KvPair>>;

    /// Replace the tag set of a key's version (latest when `version_id` is
    /// None). Implementations enforce the storage tag ceiling.
    async fn put_object_tagging(
        &self,
        bucket_id: Uuid,
        key: &str,
        version_id: Option<&str>,
        tags: &[KvPair],
    ) -> StorageResult<()>;
}
