//! Tag repository.

use crate::error::CatalogResult;
use async_trait::async_trait;
use coms_core::KvPair;
use uuid::Uuid;

/// Repository for version tag rows and joins. Implemented on a live
/// transaction.
#[async_trait]
pub trait TagRepo: Send {
    /// List the tag pairs joined to a version.
    async fn list_version_tags(&mut self, version_id: Uuid) -> CatalogResult<Vec<KvPair>>;

    /// Upsert tag rows and join them to a version.
    async fn associate_tags(&mut self, version_id: Uuid, pairs: &[KvPair]) -> CatalogResult<()>;

    /// Remove the join between a version and the given tag pairs.
    async fn dissociate_tags(&mut self, version_id: Uuid, pairs: &[KvPair]) -> CatalogResult<()>;

    /// Delete tag rows with no remaining joins. Returns the pruned count.
    async fn prune_orphan_tags(&mut self) -> CatalogResult<u64>;
}
