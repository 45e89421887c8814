//! Core types and shared configuration for COMS.
//!
//! This crate defines the small set of values shared across all other crates:
//! - Application configuration (catalog backend, sync tuning)
//! - The reserved identity tag and storage tag ceiling
//! - The key/value pair type mirrored between storage and catalog

pub mod config;
pub mod error;

pub use config::{AppConfig, CatalogConfig, SyncConfig};
pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Reserved storage tag that binds an opaque storage key to a stable catalog
/// UUID, so identity survives a catalog rebuild.
pub const RESERVED_ID_TAG: &str = "coms-id";

/// S3-compatible stores allow at most this many tags per object version.
pub const STORAGE_TAG_LIMIT: usize = 10;

/// A key/value pair as mirrored between the object store and the catalog.
///
/// Used for both object tags and user metadata; equality is over the full
/// pair, which is what the reconciler diffs on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_pair_equality_covers_both_fields() {
        let a = KvPair::new("colour", "green");
        assert_eq!(a, KvPair::new("colour", "green"));
        assert_ne!(a, KvPair::new("colour", "blue"));
        assert_ne!(a, KvPair::new("shade", "green"));
    }
}
