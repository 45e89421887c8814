//! Metadata repository.

use crate::error::CatalogResult;
use async_trait::async_trait;
use coms_core::KvPair;
use uuid::Uuid;

/// Repository for version metadata rows and joins. Implemented on a live
/// transaction. Mirrors the tag repository; metadata and tags are the same
/// key/value shape with different storage-side sources.
#[async_trait]
pub trait MetadataRepo: Send {
    /// List the metadata pairs joined to a version.
    async fn list_version_metadata(&mut self, version_id: Uuid) -> CatalogResult<Vec<KvPair>>;

    /// Upsert metadata rows and join them to a version.
    async fn associate_metadata(
        &mut self,
        version_id: Uuid,
        pairs: &[KvPair],
    ) -> CatalogResult<()>;

    /// Remove the join between a version and the given metadata pairs.
    async fn dissociate_metadata(
        &mut self,
        version_id: Uuid,
        pairs: &[KvPair],
    ) -> CatalogResult<()>;

    /// Delete metadata rows with no remaining joins. Returns the pruned count.
    async fn prune_orphan_metadata(&mut self) -> CatalogResult<u64>;
}
