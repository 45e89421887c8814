//! Repository traits for catalog operations.

pub mod metadata;
pub mod objects;
pub mod queue;
pub mod tags;
pub mod versions;

pub use metadata::MetadataRepo;
pub use objects::ObjectRepo;
pub use queue::QueueRepo;
pub use tags::TagRepo;
pub use versions::VersionRepo;
