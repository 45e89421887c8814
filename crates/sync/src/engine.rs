//! Reconciliation engine: converges the catalog with observed storage state
//! for one (bucket, path) key at a time.
//!
//! The engine reconciles four facets in order: object existence, version
//! history, tags, and user metadata. A full pass runs in one catalog
//! transaction; any error rolls the whole pass back.

use crate::error::SyncResult;
use crate::reconcile;
use coms_catalog::{
    CatalogStore, CatalogTx, MetadataRepo, ObjectRepo, ObjectRow, TagRepo, VersionRepo, VersionRow,
};
use coms_core::{KvPair, RESERVED_ID_TAG, STORAGE_TAG_LIMIT};
use coms_storage::ObjectStorage;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// One version's reconciliation result.
///
/// `modified` drives the tag/metadata shortcut: an untouched version is
/// assumed to still have accurate tag and metadata mirrors unless a full
/// pass was requested.
#[derive(Debug, Clone)]
pub struct VersionOutcome {
    pub modified: bool,
    pub version: VersionRow,
}

/// The reconciliation engine.
///
/// Holds no per-job state; a single engine value serves every job the
/// worker hands it.
pub struct SyncEngine {
    catalog: Arc<dyn CatalogStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl SyncEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { catalog, storage }
    }

    /// Reconcile every facet of one key inside a single transaction.
    ///
    /// Returns the object id when the key resolves to a live object, `None`
    /// when it is absent on both sides or was just deleted from the catalog.
    /// With `full = true`, tag and metadata reconciliation runs for every
    /// version regardless of detected drift.
    pub async fn sync_job(
        &self,
        path: &str,
        bucket_id: Uuid,
        full: bool,
        actor: Option<Uuid>,
    ) -> SyncResult<Option<Uuid>> {
        let mut tx = self.catalog.begin().await?;

        let Some(object) = self.sync_object(tx.as_mut(), bucket_id, path, actor).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let outcomes = self.sync_versions(tx.as_mut(), &object).await?;
        for outcome in &outcomes {
            if outcome.modified || full {
                self.sync_tags(tx.as_mut(), &object, &outcome.version)
                    .await?;
                self.sync_metadata(tx.as_mut(), &object, &outcome.version)
                    .await?;
            }
        }

        tx.commit().await?;
        tracing::debug!(object_id = %object.id, path, "sync pass complete");
        Ok(Some(object.id))
    }

    /// Converge object existence.
    ///
    /// A head whose latest version is a delete marker counts as absent: the
    /// key has no live content even though version history remains.
    pub async fn sync_object(
        &self,
        tx: &mut dyn CatalogTx,
        bucket_id: Uuid,
        path: &str,
        actor: Option<Uuid>,
    ) -> SyncResult<Option<ObjectRow>> {
        let existing = tx.get_object(bucket_id, path).await?;
        let head = self.storage.head_object(bucket_id, path, None).await?;
        let live = head.as_ref().is_some_and(|h| !h.delete_marker);

        match (existing, live) {
            (None, true) => {
                let id = self.derive_object_id(bucket_id, path).await?;
                let now = OffsetDateTime::now_utc();
                let object = ObjectRow {
                    id,
                    path: path.to_string(),
                    bucket_id,
                    created_by: actor,
                    created_at: now,
                    updated_at: now,
                };
                tx.insert_object(&object).await?;
                tracing::info!(object_id = %id, path, "catalog object created");
                Ok(Some(object))
            }
            (Some(object), false) => {
                tx.delete_object(object.id).await?;
                // Version rows cascade; shared tag/metadata rows may now be
                // unreferenced.
                tx.prune_orphan_tags().await?;
                tx.prune_orphan_metadata().await?;
                tracing::info!(object_id = %object.id, path, "catalog object removed");
                Ok(None)
            }
            (Some(object), true) => Ok(Some(object)),
            (None, false) => Ok(None),
        }
    }

    /// Resolve the stable identity for a live storage key.
    ///
    /// A valid `coms-id` tag is reused so identity survives a catalog
    /// rebuild. Otherwise a fresh UUID is minted and written back to
    /// storage, provided the tag ceiling leaves room.
    async fn derive_object_id(&self, bucket_id: Uuid, path: &str) -> SyncResult<Uuid> {
        let mut tags = self.storage.get_object_tagging(bucket_id, path, None).await?;

        if let Some(tag) = tags.iter().find(|t| t.key == RESERVED_ID_TAG) {
            if let Ok(id) = Uuid::parse_str(&tag.value) {
                return Ok(id);
            }
        }

        let id = Uuid::new_v4();
        if tags.len() < STORAGE_TAG_LIMIT {
            tags.push(KvPair::new(RESERVED_ID_TAG, id.to_string()));
            self.storage
                .put_object_tagging(bucket_id, path, None, &tags)
                .await?;
        }
        Ok(id)
    }

    /// Converge the catalog's version rows with storage's version history.
    ///
    /// Versioned buckets reconcile by storage version id: missing versions
    /// (delete markers included) are inserted, vanished ones deleted, and
    /// the latest flag mirrored. Unversioned buckets keep a single synthetic
    /// row with a null version id, updated in place when the key's ETag or
    /// content type changes.
    pub async fn sync_versions(
        &self,
        tx: &mut dyn CatalogTx,
        object: &ObjectRow,
    ) -> SyncResult<Vec<VersionOutcome>> {
        let existing = tx.list_versions(object.id).await?;
        let listing = self
            .storage
            .list_object_versions(object.bucket_id, &object.path)
            .await?;

        let mut modified: HashSet<Uuid> = HashSet::new();

        if listing.is_versioned() {
            let live_ids: HashSet<&str> = listing
                .entries()
                .filter_map(|(entry, _)| entry.version_id.as_deref())
                .collect();

            for row in &existing {
                let stale = match row.s3_version_id.as_deref() {
                    Some(id) => !live_ids.contains(id),
                    // A synthetic row has no place in a versioned history.
                    None => true,
                };
                if stale {
                    tx.delete_version(row.id).await?;
                }
            }

            let known: HashSet<&str> = existing
                .iter()
                .filter_map(|row| row.s3_version_id.as_deref())
                .collect();
            for (entry, marker) in listing.entries() {
                let Some(version_id) = entry.version_id.as_deref() else {
                    continue;
                };
                if known.contains(version_id) {
                    continue;
                }
                let (etag, mime_type) = if marker {
                    (None, None)
                } else {
                    match self
                        .storage
                        .head_object(object.bucket_id, &object.path, Some(version_id))
                        .await?
                    {
                        Some(head) => (head.etag, head.mime_type),
                        None => (entry.etag.clone(), None),
                    }
                };
                let now = OffsetDateTime::now_utc();
                let row = VersionRow {
                    id: Uuid::new_v4(),
                    object_id: object.id,
                    s3_version_id: Some(version_id.to_string()),
                    etag,
                    mime_type,
                    is_latest: entry.is_latest,
                    delete_marker: marker,
                    created_at: now,
                    updated_at: now,
                };
                tx.insert_version(&row).await?;
                modified.insert(row.id);
            }

            // Mirror the storage-reported latest flag exactly.
            let rows = tx.list_versions(object.id).await?;
            let storage_latest = listing
                .entries()
                .find(|(entry, _)| entry.is_latest)
                .and_then(|(entry, _)| entry.version_id.clone());
            let latest_row = storage_latest.as_deref().and_then(|version_id| {
                rows.iter()
                    .find(|row| row.s3_version_id.as_deref() == Some(version_id))
                    .map(|row| row.id)
            });
            tx.set_latest_version(object.id, latest_row).await?;
        } else {
            let Some(head) = self
                .storage
                .head_object(object.bucket_id, &object.path, None)
                .await?
            else {
                // Vanished between the object probe and here; the next pass
                // will remove the catalog rows.
                return Ok(Vec::new());
            };

            for row in &existing {
                // Real version ids are stale once the bucket reports
                // unversioned.
                if row.s3_version_id.is_some() {
                    tx.delete_version(row.id).await?;
                }
            }

            match existing.iter().find(|row| row.s3_version_id.is_none()) {
                Some(row) => {
                    if row.etag != head.etag || row.mime_type != head.mime_type {
                        tx.update_version_content(
                            row.id,
                            head.etag.as_deref(),
                            head.mime_type.as_deref(),
                        )
                        .await?;
                        modified.insert(row.id);
                    }
                    tx.set_latest_version(object.id, Some(row.id)).await?;
                }
                None => {
                    let now = OffsetDateTime::now_utc();
                    let row = VersionRow {
                        id: Uuid::new_v4(),
                        object_id: object.id,
                        s3_version_id: None,
                        etag: head.etag,
                        mime_type: head.mime_type,
                        is_latest: true,
                        delete_marker: false,
                        created_at: now,
                        updated_at: now,
                    };
                    tx.insert_version(&row).await?;
                    modified.insert(row.id);
                    tx.set_latest_version(object.id, Some(row.id)).await?;
                }
            }
        }

        let rows = tx.list_versions(object.id).await?;
        Ok(rows
            .into_iter()
            .map(|version| VersionOutcome {
                modified: modified.contains(&version.id),
                version,
            })
            .collect())
    }

    /// Converge one version's tag mirror with storage.
    ///
    /// Also maintains the `coms-id` bookkeeping tag: written to storage only
    /// on the object's latest version, only when absent, and only below the
    /// tag ceiling. Never forced onto non-latest versions.
    pub async fn sync_tags(
        &self,
        tx: &mut dyn CatalogTx,
        object: &ObjectRow,
        version: &VersionRow,
    ) -> SyncResult<Vec<KvPair>> {
        if version.delete_marker {
            return Ok(Vec::new());
        }

        let current = tx.list_version_tags(version.id).await?;
        let mut desired = self
            .storage
            .get_object_tagging(object.bucket_id, &object.path, version.s3_version_id.as_deref())
            .await?;

        let has_id_tag = desired.iter().any(|tag| tag.key == RESERVED_ID_TAG);
        if version.is_latest && !has_id_tag && desired.len() < STORAGE_TAG_LIMIT {
            desired.push(KvPair::new(RESERVED_ID_TAG, object.id.to_string()));
            self.storage
                .put_object_tagging(
                    object.bucket_id,
                    &object.path,
                    version.s3_version_id.as_deref(),
                    &desired,
                )
                .await?;
        }

        let diff = reconcile::diff(&current, &desired, Clone::clone);
        if !diff.to_add.is_empty() {
            tx.associate_tags(version.id, &diff.to_add).await?;
        }
        if !diff.to_remove.is_empty() {
            tx.dissociate_tags(version.id, &diff.to_remove).await?;
            tx.prune_orphan_tags().await?;
        }
        Ok(desired)
    }

    /// Converge one version's user-metadata mirror with storage.
    pub async fn sync_metadata(
        &self,
        tx: &mut dyn CatalogTx,
        object: &ObjectRow,
        version: &VersionRow,
    ) -> SyncResult<Vec<KvPair>> {
        if version.delete_marker {
            return Ok(Vec::new());
        }

        let current = tx.list_version_metadata(version.id).await?;
        let head = self
            .storage
            .head_object(object.bucket_id, &object.path, version.s3_version_id.as_deref())
            .await?;
        let desired: Vec<KvPair> = head
            .map(|h| {
                h.metadata
                    .into_iter()
                    .map(|(key, value)| KvPair::new(key, value))
                    .collect()
            })
            .unwrap_or_default();

        let diff = reconcile::diff(&current, &desired, Clone::clone);
        if !diff.to_add.is_empty() {
            tx.associate_metadata(version.id, &diff.to_add).await?;
        }
        if !diff.to_remove.is_empty() {
            tx.dissociate_metadata(version.id, &diff.to_remove).await?;
            tx.prune_orphan_metadata().await?;
        }
        Ok(desired)
    }
}
