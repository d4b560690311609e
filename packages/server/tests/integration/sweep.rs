use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::AssetState;

use crate::common::{TestApp, image, post};

const RETENTION: StdDuration = StdDuration::from_secs(24 * 3600);

#[tokio::test]
async fn expired_staged_uploads_are_removed() {
    let app = TestApp::spawn().await;
    let old = app.stage("u1", "old.png").await;
    let fresh = app.stage("u1", "fresh.png").await;
    app.backdate(old.id, Utc::now() - Duration::hours(25)).await;

    let report = app.lifecycle.sweep(RETENTION).await.unwrap();

    assert_eq!(report.expired, vec![old.id]);
    assert!(app.find(old.id).await.is_none());
    assert!(!app.object_exists(&old.storage_key));
    assert!(app.find(fresh.id).await.is_some());
}

#[tokio::test]
async fn confirmed_assets_are_never_expired() {
    let app = TestApp::spawn().await;
    let a = app.stage("u1", "a.png").await;
    app.lifecycle
        .reconcile_on_save("u1", &post("p1"), &image(&a))
        .await
        .unwrap();
    app.backdate(a.id, Utc::now() - Duration::days(30)).await;

    let report = app.lifecycle.sweep(RETENTION).await.unwrap();

    assert!(report.expired.is_empty());
    assert_eq!(app.find(a.id).await.unwrap().state, AssetState::Confirmed);
}

#[tokio::test]
async fn record_without_object_is_still_removed() {
    let app = TestApp::spawn().await;
    let old = app.stage("u1", "old.png").await;
    app.backdate(old.id, Utc::now() - Duration::days(2)).await;
    tokio::fs::remove_file(app.objects_root().join(&old.storage_key))
        .await
        .unwrap();

    let report = app.lifecycle.sweep(RETENTION).await.unwrap();

    assert_eq!(report.expired, vec![old.id]);
    assert!(app.all_assets().await.is_empty());
}

mod failed_moves {
    use super::*;

    #[tokio::test]
    async fn asset_is_confirmed_at_its_staged_key() {
        let app = TestApp::spawn().await;
        let a = app.stage("u1", "a.png").await;
        let body = image(&a);
        app.store.fail_next_moves(1);

        let report = app
            .lifecycle
            .reconcile_on_save("u1", &post("p1"), &body)
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert!(report.promoted.is_empty());
        assert_eq!(report.body, body);

        let stuck = app.find(a.id).await.unwrap();
        assert_eq!(stuck.state, AssetState::Confirmed);
        assert_eq!(stuck.storage_key, a.storage_key);
        assert_eq!(stuck.entity(), Some(post("p1")));
        assert!(app.object_exists(&a.storage_key));
    }

    #[tokio::test]
    async fn sweep_completes_the_move() {
        let app = TestApp::spawn().await;
        let a = app.stage("u1", "a.png").await;
        app.store.fail_next_moves(1);
        app.lifecycle
            .reconcile_on_save("u1", &post("p1"), &image(&a))
            .await
            .unwrap();

        let report = app.lifecycle.sweep(RETENTION).await.unwrap();

        assert_eq!(report.settled, vec![a.id]);
        let settled = app.find(a.id).await.unwrap();
        assert_eq!(settled.storage_key, format!("u1/post/p1/{}", a.filename));
        assert!(app.object_exists(&settled.storage_key));
        assert!(!app.object_exists(&a.storage_key));

        // The URL captured before the move still resolves.
        let resolved = app.lifecycle.resolve(&a.storage_key).await.unwrap();
        assert_eq!(resolved.id, a.id);
    }

    #[tokio::test]
    async fn sweep_leaves_settled_assets_alone() {
        let app = TestApp::spawn().await;
        let settled = app.stage("u1", "settled.png").await;
        app.lifecycle
            .reconcile_on_save("u1", &post("p1"), &image(&settled))
            .await
            .unwrap();
        let stuck = app.stage("u1", "stuck.png").await;
        app.store.fail_next_moves(1);
        app.lifecycle
            .reconcile_on_save("u1", &post("p2"), &image(&stuck))
            .await
            .unwrap();
        let (_, moves_before, _) = app.store.calls();

        let report = app.lifecycle.sweep(RETENTION).await.unwrap();

        assert_eq!(report.settled, vec![stuck.id]);
        assert_eq!(app.store.calls().1, moves_before + 1);
        let untouched = app.find(settled.id).await.unwrap();
        assert_eq!(untouched.storage_key, format!("u1/post/p1/{}", settled.filename));
    }

    #[tokio::test]
    async fn unsettled_asset_survives_later_saves() {
        let app = TestApp::spawn().await;
        let a = app.stage("u1", "a.png").await;
        app.store.fail_next_moves(1);
        app.lifecycle
            .reconcile_on_save("u1", &post("p1"), &image(&a))
            .await
            .unwrap();

        let report = app
            .lifecycle
            .reconcile_on_save("u1", &post("p1"), &image(&a))
            .await
            .unwrap();

        assert!(report.pruned.is_empty());
        assert!(report.released.is_empty());
        assert!(app.find(a.id).await.is_some());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let app = TestApp::spawn_with(|config| config.lifecycle.store_retries = 2).await;
        let a = app.stage("u1", "a.png").await;
        app.store.fail_next_moves(1);

        let report = app
            .lifecycle
            .reconcile_on_save("u1", &post("p1"), &image(&a))
            .await
            .unwrap();

        assert!(report.failed.is_empty());
        assert_eq!(report.promoted.len(), 1);
        assert_eq!(app.store.calls().1, 2);
    }
}
