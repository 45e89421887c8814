//! Reconciliation subsystem: job queue consumer, sync engine, worker driver.
//!
//! The catalog mirrors an object store that other tools mutate directly, so
//! it drifts. This crate converges it: jobs name a (bucket, path) key, the
//! engine reconciles that key's object row, version history, tags, and
//! metadata in one transaction, and the worker drains the queue one job at
//! a time with bounded retries.

pub mod engine;
pub mod error;
pub mod reconcile;
pub mod worker;

pub use engine::{SyncEngine, VersionOutcome};
pub use error::{SyncError, SyncResult};
pub use worker::SyncWorker;
