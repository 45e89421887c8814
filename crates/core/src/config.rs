//! Configuration types shared across crates.

use crate::error::Result;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Catalog database backend.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Reconciliation worker tuning.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file with `COMS_` environment overrides.
    ///
    /// Environment variables use `__` as the section separator, e.g.
    /// `COMS_SYNC__MAX_RETRIES=5`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("COMS_").split("__"))
            .extract()?;
        Ok(config)
    }
}

/// Catalog database backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogConfig {
    /// SQLite database. Suitable for testing and single-process deployments;
    /// concurrent dequeuers across processes require PostgreSQL.
    Sqlite {
        /// Path to the database file.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (postgres://...).
        url: String,
        /// Maximum pool connections.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Optional statement timeout to prevent hung queries.
        #[serde(default)]
        statement_timeout_ms: Option<u64>,
    },
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/catalog.db"),
        }
    }
}

/// Reconciliation worker tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum retry count before a failing job is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between queue polls when the worker is idle.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl SyncConfig {
    /// Get the queue poll interval as a Duration.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_check_interval_secs() -> u64 {
    10
}
