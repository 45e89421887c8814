//! Value types returned by the storage interface.

use std::collections::HashMap;

/// Result of a head-object call against a key or a specific version.
#[derive(Clone, Debug)]
pub struct ObjectHead {
    /// ETag reported by the store, if any.
    pub etag: Option<String>,
    /// Content type reported by the store, if any.
    pub mime_type: Option<String>,
    /// Whether the probed version is a delete marker. A key whose latest
    /// version is a delete marker heads as a marker, not as absent; callers
    /// decide how to treat it.
    pub delete_marker: bool,
    /// Version id of the probed version. None for unversioned buckets.
    pub version_id: Option<String>,
    /// User metadata map for the probed version.
    pub metadata: HashMap<String, String>,
}

/// One entry in a key's version history.
#[derive(Clone, Debug)]
pub struct VersionEntry {
    /// Storage version id. None for the single entry of an unversioned bucket.
    pub version_id: Option<String>,
    /// ETag, if the entry carries content (delete markers do not).
    pub etag: Option<String>,
    /// Whether the store reports this entry as the key's latest.
    pub is_latest: bool,
}

/// Full version history for a key: content versions plus delete markers.
#[derive(Clone, Debug, Default)]
pub struct VersionListing {
    pub versions: Vec<VersionEntry>,
    pub delete_markers: Vec<VersionEntry>,
}

impl VersionListing {
    /// Whether the listing reports real (non-null) version ids.
    pub fn is_versioned(&self) -> bool {
        self.versions
            .iter()
            .chain(self.delete_markers.iter())
            .any(|entry| entry.version_id.is_some())
    }

    /// Iterate content versions and delete markers together, markers flagged.
    pub fn entries(&self) -> impl Iterator<Item = (&VersionEntry, bool)> {
        self.versions
            .iter()
            .map(|entry| (entry, false))
            .chain(self.delete_markers.iter().map(|entry| (entry, true)))
    }
}
