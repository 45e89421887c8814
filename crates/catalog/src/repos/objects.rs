//! Object repository.

use crate::error::CatalogResult;
use crate::models::ObjectRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for catalog object rows. Implemented on a live transaction.
#[async_trait]
pub trait ObjectRepo: Send {
    /// Get the object tracking a (bucket, path) key, if any.
    async fn get_object(&mut self, bucket_id: Uuid, path: &str)
        -> CatalogResult<Option<ObjectRow>>;

    /// Get an object by id.
    async fn get_object_by_id(&mut self, id: Uuid) -> CatalogResult<Option<ObjectRow>>;

    /// Insert a new object row.
    async fn insert_object(&mut self, object: &ObjectRow) -> CatalogResult<()>;

    /// Delete an object row. Versions (and their tag/metadata joins) cascade.
    async fn delete_object(&mut self, id: Uuid) -> CatalogResult<()>;
}
