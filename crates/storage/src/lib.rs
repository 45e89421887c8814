//! Object storage interface for COMS.
//!
//! This crate defines the storage surface the reconciliation engine consumes:
//! head/list-versions/get-tagging/put-tagging per (bucket, key[, version]).
//! The production S3 client lives upstream; this crate ships the trait and a
//! deterministic in-memory backend used by tests and local development.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use traits::ObjectStorage;
pub use types::{ObjectHead, VersionEntry, VersionListing};
