use common::AssetState;
use common::storage::EntityType;
use server::lifecycle::{EntityRef, LifecycleError};

use crate::common::{TestApp, file, is_staged, post};

#[tokio::test]
async fn uploads_are_staged_under_owner_temp_namespace() {
    let app = TestApp::spawn().await;

    let outcomes = app
        .lifecycle
        .upload(
            "u1",
            vec![file("chart.png", b"PNGDATA"), file("notes.pdf", b"%PDF-1.7")],
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        let descriptor = outcome.result.as_ref().expect("file should be accepted");
        let asset = &descriptor.asset;
        assert!(is_staged(asset));
        assert!(asset.storage_key.starts_with("u1/temp/"));
        assert_eq!(asset.entity_type, None);
        assert_eq!(descriptor.url, format!("/files/{}", asset.storage_key));
        assert!(app.object_exists(&asset.storage_key));
    }

    let first = &outcomes[0].result.as_ref().unwrap().asset;
    assert_eq!(first.original_name, "chart.png");
    assert_eq!(first.mime_type, "image/png");
    assert_eq!(first.size_bytes, 7);
    assert_eq!(first.content_hash, common::storage::checksum(b"PNGDATA"));
}

#[tokio::test]
async fn same_name_uploads_get_distinct_keys() {
    let app = TestApp::spawn().await;

    let a = app.stage("u1", "photo.png").await;
    let b = app.stage("u1", "photo.png").await;

    assert_ne!(a.storage_key, b.storage_key);
    assert!(app.object_exists(&a.storage_key));
    assert!(app.object_exists(&b.storage_key));
}

#[tokio::test]
async fn rejected_files_leave_no_trace() {
    let app = TestApp::spawn().await;

    let outcomes = app
        .lifecycle
        .upload(
            "u1",
            vec![
                file("setup.exe", b"MZ"),
                file("empty.png", b""),
                file("huge.png", &[0u8; 2048]),
                file("../escape.png", b"x"),
            ],
            None,
        )
        .await
        .unwrap();

    assert!(outcomes.iter().all(|o| matches!(
        o.result,
        Err(LifecycleError::UploadRejected(_))
    )));
    assert!(app.all_assets().await.is_empty());
    assert_eq!(app.store.calls(), (0, 0, 0));
}

#[tokio::test]
async fn mixed_batch_reports_each_file_in_order() {
    let app = TestApp::spawn().await;

    let outcomes = app
        .lifecycle
        .upload(
            "u1",
            vec![
                file("a.png", b"A"),
                file("b.exe", b"B"),
                file("c.jpg", b"C"),
            ],
            None,
        )
        .await
        .unwrap();

    let names: Vec<&str> = outcomes.iter().map(|o| o.original_name.as_str()).collect();
    assert_eq!(names, ["a.png", "b.exe", "c.jpg"]);
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[1].result.is_err());
    assert!(outcomes[2].result.is_ok());

    let stored = app.all_assets().await;
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|a| a.state == AssetState::Staged));
}

#[tokio::test]
async fn too_many_files_rejects_the_whole_request() {
    let app = TestApp::spawn_with(|config| config.upload.max_files = 2).await;

    let result = app
        .lifecycle
        .upload(
            "u1",
            vec![file("a.png", b"A"), file("b.png", b"B"), file("c.png", b"C")],
            None,
        )
        .await;

    assert!(matches!(result, Err(LifecycleError::UploadRejected(_))));
    assert!(app.all_assets().await.is_empty());
}

#[tokio::test]
async fn staged_listing_is_per_owner() {
    let app = TestApp::spawn().await;
    let mine = app.stage("u1", "mine.png").await;
    app.stage("u2", "theirs.png").await;

    let listed = app.lifecycle.list_staged("u1").await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].asset.id, mine.id);
}

#[tokio::test]
async fn upload_into_entity_skips_staging() {
    let app = TestApp::spawn().await;

    let outcomes = app
        .lifecycle
        .upload("u1", vec![file("cover.jpg", b"JPG")], Some(&post("p9")))
        .await
        .unwrap();

    let asset = &outcomes[0].result.as_ref().unwrap().asset;
    assert_eq!(asset.state, AssetState::Confirmed);
    assert!(asset.storage_key.starts_with("u1/post/p9/"));
    assert_eq!(asset.entity(), Some(post("p9")));
    assert!(app.object_exists(&asset.storage_key));
    assert!(app.lifecycle.list_staged("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn upload_into_avatar_slot_is_refused() {
    let app = TestApp::spawn().await;
    let slot = EntityRef::new(EntityType::Avatar, "u1").unwrap();

    let result = app
        .lifecycle
        .upload("u1", vec![file("me.png", b"PNG")], Some(&slot))
        .await;

    assert!(matches!(result, Err(LifecycleError::InvalidReference(_))));
    assert!(app.all_assets().await.is_empty());
}
