//! Catalog persistence for the reconciliation service.
//!
//! The catalog is the relational mirror of object storage: objects,
//! versions, tags, metadata, and the pending sync job queue. Two backends
//! implement the same [`CatalogStore`] trait: SQLite for testing and
//! single-process deployments, PostgreSQL for everything else.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{CatalogError, CatalogResult};
pub use models::{NewJob, ObjectRow, QueueJobRow, VersionRow};
pub use postgres::PostgresCatalog;
pub use repos::{MetadataRepo, ObjectRepo, QueueRepo, TagRepo, VersionRepo};
pub use store::{CatalogStore, CatalogTx, SqliteCatalog};

use coms_core::config::CatalogConfig;
use std::sync::Arc;

/// Build a catalog store from configuration.
pub async fn from_config(config: &CatalogConfig) -> CatalogResult<Arc<dyn CatalogStore>> {
    match config {
        CatalogConfig::Sqlite { path } => {
            tracing::info!("using SQLite catalog at {}", path.display());
            let store = SqliteCatalog::new(path).await?;
            Ok(Arc::new(store))
        }
        CatalogConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("connecting to PostgreSQL catalog");
            let store =
                PostgresCatalog::from_url(url, *max_connections, *statement_timeout_ms).await?;
            Ok(Arc::new(store))
        }
    }
}
