//! Version repository.

use crate::error::CatalogResult;
use crate::models::VersionRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for catalog version rows. Implemented on a live transaction.
#[async_trait]
pub trait VersionRepo: Send {
    /// List all versions for an object, oldest first.
    async fn list_versions(&mut self, object_id: Uuid) -> CatalogResult<Vec<VersionRow>>;

    /// Insert a new version row.
    async fn insert_version(&mut self, version: &VersionRow) -> CatalogResult<()>;

    /// Delete a version row. Tag/metadata joins cascade.
    async fn delete_version(&mut self, id: Uuid) -> CatalogResult<()>;

    /// Update etag/mime of a version in place (unversioned drift).
    async fn update_version_content(
        &mut self,
        id: Uuid,
        etag: Option<&str>,
        mime_type: Option<&str>,
    ) -> CatalogResult<()>;

    /// Mark one version latest and clear the flag on the object's others.
    /// `None` clears the flag everywhere.
    async fn set_latest_version(
        &mut self,
        object_id: Uuid,
        version_id: Option<Uuid>,
    ) -> CatalogResult<()>;
}
