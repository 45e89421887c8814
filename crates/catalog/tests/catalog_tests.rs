//! Object, version, tag, and metadata repository behavior, plus transaction
//! commit/rollback semantics.

mod common;

use coms_catalog::{
    CatalogStore, CatalogTx, MetadataRepo, ObjectRepo, ObjectRow, TagRepo, VersionRepo, VersionRow,
};
use coms_core::KvPair;
use time::OffsetDateTime;
use uuid::Uuid;

fn object_row(bucket_id: Uuid, path: &str) -> ObjectRow {
    let now = OffsetDateTime::now_utc();
    ObjectRow {
        id: Uuid::new_v4(),
        path: path.to_string(),
        bucket_id,
        created_by: None,
        created_at: now,
        updated_at: now,
    }
}

fn version_row(object_id: Uuid, s3_version_id: Option<&str>, is_latest: bool) -> VersionRow {
    let now = OffsetDateTime::now_utc();
    VersionRow {
        id: Uuid::new_v4(),
        object_id,
        s3_version_id: s3_version_id.map(str::to_string),
        etag: Some("\"abc123\"".to_string()),
        mime_type: Some("text/plain".to_string()),
        is_latest,
        delete_marker: false,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn object_insert_get_delete_round_trip() {
    let catalog = common::test_catalog().await;
    let bucket = Uuid::new_v4();
    let object = object_row(bucket, "photos/cat.jpg");

    let mut tx = catalog.store.begin().await.unwrap();
    tx.insert_object(&object).await.unwrap();

    let found = tx.get_object(bucket, "photos/cat.jpg").await.unwrap();
    assert_eq!(found.unwrap().id, object.id);
    let by_id = tx.get_object_by_id(object.id).await.unwrap();
    assert_eq!(by_id.unwrap().path, "photos/cat.jpg");

    tx.delete_object(object.id).await.unwrap();
    assert!(tx
        .get_object(bucket, "photos/cat.jpg")
        .await
        .unwrap()
        .is_none());
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn dropping_a_transaction_rolls_back() {
    let catalog = common::test_catalog().await;
    let bucket = Uuid::new_v4();
    let object = object_row(bucket, "uncommitted.txt");

    {
        let mut tx = catalog.store.begin().await.unwrap();
        tx.insert_object(&object).await.unwrap();
        // Dropped without commit.
    }

    let mut tx = catalog.store.begin().await.unwrap();
    assert!(tx
        .get_object(bucket, "uncommitted.txt")
        .await
        .unwrap()
        .is_none());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn set_latest_version_is_exclusive() {
    let catalog = common::test_catalog().await;
    let object = object_row(Uuid::new_v4(), "versioned.bin");
    let v1 = version_row(object.id, Some("v000001"), true);
    let v2 = version_row(object.id, Some("v000002"), false);

    let mut tx = catalog.store.begin().await.unwrap();
    tx.insert_object(&object).await.unwrap();
    tx.insert_version(&v1).await.unwrap();
    tx.insert_version(&v2).await.unwrap();

    tx.set_latest_version(object.id, Some(v2.id)).await.unwrap();
    let versions = tx.list_versions(object.id).await.unwrap();
    let latest: Vec<Uuid> = versions
        .iter()
        .filter(|v| v.is_latest)
        .map(|v| v.id)
        .collect();
    assert_eq!(latest, vec![v2.id]);

    tx.set_latest_version(object.id, None).await.unwrap();
    let versions = tx.list_versions(object.id).await.unwrap();
    assert!(versions.iter().all(|v| !v.is_latest));
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn update_version_content_changes_etag_and_mime() {
    let catalog = common::test_catalog().await;
    let object = object_row(Uuid::new_v4(), "note.md");
    let version = version_row(object.id, None, true);

    let mut tx = catalog.store.begin().await.unwrap();
    tx.insert_object(&object).await.unwrap();
    tx.insert_version(&version).await.unwrap();

    tx.update_version_content(version.id, Some("\"def456\""), Some("text/markdown"))
        .await
        .unwrap();
    let versions = tx.list_versions(object.id).await.unwrap();
    assert_eq!(versions[0].etag.as_deref(), Some("\"def456\""));
    assert_eq!(versions[0].mime_type.as_deref(), Some("text/markdown"));
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn tags_associate_dissociate_and_prune() {
    let catalog = common::test_catalog().await;
    let object = object_row(Uuid::new_v4(), "tagged.txt");
    let version = version_row(object.id, None, true);

    let mut tx = catalog.store.begin().await.unwrap();
    tx.insert_object(&object).await.unwrap();
    tx.insert_version(&version).await.unwrap();

    let pairs = vec![KvPair::new("env", "prod"), KvPair::new("team", "search")];
    tx.associate_tags(version.id, &pairs).await.unwrap();
    // Re-associating is idempotent.
    tx.associate_tags(version.id, &pairs).await.unwrap();

    let mut listed = tx.list_version_tags(version.id).await.unwrap();
    listed.sort_by(|a, b| a.key.cmp(&b.key));
    assert_eq!(listed, pairs);

    tx.dissociate_tags(version.id, &[KvPair::new("env", "prod")])
        .await
        .unwrap();
    let listed = tx.list_version_tags(version.id).await.unwrap();
    assert_eq!(listed, vec![KvPair::new("team", "search")]);

    // "env=prod" no longer joins to any version.
    let pruned = tx.prune_orphan_tags().await.unwrap();
    assert_eq!(pruned, 1);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn metadata_mirrors_tag_behavior() {
    let catalog = common::test_catalog().await;
    let object = object_row(Uuid::new_v4(), "annotated.txt");
    let version = version_row(object.id, None, true);

    let mut tx = catalog.store.begin().await.unwrap();
    tx.insert_object(&object).await.unwrap();
    tx.insert_version(&version).await.unwrap();

    let pairs = vec![KvPair::new("author", "mallory")];
    tx.associate_metadata(version.id, &pairs).await.unwrap();
    assert_eq!(tx.list_version_metadata(version.id).await.unwrap(), pairs);

    tx.dissociate_metadata(version.id, &pairs).await.unwrap();
    assert!(tx.list_version_metadata(version.id).await.unwrap().is_empty());
    assert_eq!(tx.prune_orphan_metadata().await.unwrap(), 1);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn shared_tags_survive_pruning_while_joined_elsewhere() {
    let catalog = common::test_catalog().await;
    let object = object_row(Uuid::new_v4(), "shared.txt");
    let v1 = version_row(object.id, Some("v000001"), false);
    let v2 = version_row(object.id, Some("v000002"), true);

    let mut tx = catalog.store.begin().await.unwrap();
    tx.insert_object(&object).await.unwrap();
    tx.insert_version(&v1).await.unwrap();
    tx.insert_version(&v2).await.unwrap();

    let shared = vec![KvPair::new("class", "public")];
    tx.associate_tags(v1.id, &shared).await.unwrap();
    tx.associate_tags(v2.id, &shared).await.unwrap();

    tx.dissociate_tags(v1.id, &shared).await.unwrap();
    // Still joined to v2, so nothing to prune.
    assert_eq!(tx.prune_orphan_tags().await.unwrap(), 0);
    assert_eq!(tx.list_version_tags(v2.id).await.unwrap(), shared);
    tx.commit().await.unwrap();
}
