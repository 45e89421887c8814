//! Reconciliation error types.

use coms_catalog::CatalogError;
use coms_storage::StorageError;
use thiserror::Error;

/// Errors raised while reconciling a key.
///
/// Any error mid-pass rolls the catalog transaction back; the worker then
/// applies its retry policy.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for reconciliation operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
