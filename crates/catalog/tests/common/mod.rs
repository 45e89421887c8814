//! Shared test fixtures for catalog integration tests.

use coms_catalog::{CatalogStore, SqliteCatalog};
use std::sync::Arc;
use tempfile::TempDir;

/// A SQLite catalog backed by a temporary directory. The directory is
/// removed when the harness drops.
pub struct TestCatalog {
    pub store: Arc<SqliteCatalog>,
    _dir: TempDir,
}

pub async fn test_catalog() -> TestCatalog {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = SqliteCatalog::new(dir.path().join("catalog.db"))
        .await
        .expect("failed to open sqlite catalog");
    store.migrate().await.expect("migration failed");
    TestCatalog {
        store: Arc::new(store),
        _dir: dir,
    }
}
