use serde_json::json;

use crate::common::{TestApp, routes};

const WRITER: &[&str] = &["content:write", "content:delete"];

mod uploads {
    use super::*;

    #[tokio::test]
    async fn upload_returns_per_file_results() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", &[]);

        let res = app
            .upload_with_token(
                routes::ASSETS,
                &[("chart.png", "PNG"), ("virus.exe", "MZ")],
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["stored"], 1);
        assert_eq!(res.body["rejected"], 1);
        let results = res.body["results"].as_array().unwrap();
        assert_eq!(results[0]["original_name"], "chart.png");
        assert_eq!(results[0]["asset"]["state"], "staged");
        assert!(
            results[0]["asset"]["url"]
                .as_str()
                .unwrap()
                .starts_with("/files/u1/temp/")
        );
        assert!(results[1]["asset"].is_null());
        assert!(results[1]["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn upload_with_entity_fields_is_confirmed_in_place() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", &[]);

        let res = app
            .upload_form_with_token(
                routes::ASSETS,
                &[("cover.png", "PNG")],
                &[("entity_type", "event"), ("entity_id", "e7")],
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        let asset = &res.body["results"][0]["asset"];
        assert_eq!(asset["confirmed"], true);
        assert_eq!(asset["entity"]["entity_type"], "event");
        assert!(
            asset["url"]
                .as_str()
                .unwrap()
                .starts_with("/files/u1/event/e7/")
        );
    }

    #[tokio::test]
    async fn upload_with_half_an_entity_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", &[]);

        let res = app
            .upload_form_with_token(
                routes::ASSETS,
                &[("cover.png", "PNG")],
                &[("entity_id", "e7")],
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert!(app.all_assets().await.is_empty());
    }

    #[tokio::test]
    async fn upload_requires_authentication() {
        let app = TestApp::spawn().await;

        let res = app
            .upload_with_token(routes::ASSETS, &[("a.png", "A")], "not-a-token")
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
        assert!(app.all_assets().await.is_empty());
    }

    #[tokio::test]
    async fn too_many_files_is_a_bad_request() {
        let app = TestApp::spawn_with(|config| config.upload.max_files = 1).await;
        let token = app.token("u1", &[]);

        let res = app
            .upload_with_token(routes::ASSETS, &[("a.png", "A"), ("b.png", "B")], &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "UPLOAD_REJECTED");
        assert!(app.all_assets().await.is_empty());
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_on_its_own() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", &[]);
        let big = "x".repeat(5000);

        let res = app
            .upload_with_token(
                routes::ASSETS,
                &[("big.png", big.as_str()), ("ok.png", "OK")],
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["stored"], 1);
        assert_eq!(res.body["rejected"], 1);
        let error = res.body["results"][0]["error"].as_str().unwrap();
        assert!(error.contains("byte limit"), "{error}");
        assert_eq!(res.body["results"][1]["asset"]["state"], "staged");
        assert_eq!(app.all_assets().await.len(), 1);
    }

    #[tokio::test]
    async fn request_over_the_ceiling_is_payload_too_large() {
        let app = TestApp::spawn_with(|config| config.upload.max_files = 1).await;
        let token = app.token("u1", &[]);
        let huge = "x".repeat(80_000);

        let res = app
            .upload_with_token(routes::ASSETS, &[("huge.png", huge.as_str())], &token)
            .await;

        assert_eq!(res.status, 413, "{}", res.text);
        assert_eq!(res.body["code"], "PAYLOAD_TOO_LARGE");
        assert!(app.all_assets().await.is_empty());
    }

    #[tokio::test]
    async fn staged_list_and_get_are_owner_scoped() {
        let app = TestApp::spawn().await;
        let asset = app.stage("u1", "a.png").await;
        let owner = app.token("u1", &[]);
        let stranger = app.token("u2", &[]);

        let mine = app.get_with_token(routes::STAGED, &owner).await;
        assert_eq!(mine.status, 200);
        assert_eq!(mine.body["total"], 1);

        let theirs = app.get_with_token(routes::STAGED, &stranger).await;
        assert_eq!(theirs.body["total"], 0);

        let path = routes::asset(&asset.id.to_string());
        assert_eq!(app.get_with_token(&path, &owner).await.status, 200);
        let denied = app.get_with_token(&path, &stranger).await;
        assert_eq!(denied.status, 403);
        assert_eq!(denied.body["code"], "PERMISSION_DENIED");
    }
}

mod content_hooks {
    use super::*;

    #[tokio::test]
    async fn save_then_download_through_the_rewritten_url() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", WRITER);
        let upload = app
            .upload_with_token(routes::ASSETS, &[("chart.png", "PNGBYTES")], &token)
            .await;
        let staged_url = upload.body["results"][0]["asset"]["url"]
            .as_str()
            .unwrap()
            .to_string();

        let res = app
            .post_with_token(
                &routes::content_saved("post", "p1"),
                &json!({ "body": format!("![chart]({staged_url})") }),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        let final_url = res.body["promoted"][0]["url"].as_str().unwrap().to_string();
        assert!(final_url.starts_with("/files/u1/post/p1/"));
        assert_eq!(res.body["body"], format!("![chart]({final_url})"));

        let download = app.get_raw(&final_url, None).await;
        assert_eq!(download.status().as_u16(), 200);
        assert_eq!(download.headers()["content-type"], "image/png");
        let etag = download.headers()["etag"].to_str().unwrap().to_string();
        assert_eq!(download.bytes().await.unwrap().as_ref(), b"PNGBYTES");

        // The staged URL keeps working after promotion.
        let via_old = app.get_raw(&staged_url, None).await;
        assert_eq!(via_old.status().as_u16(), 200);

        let cached = app.get_raw(&final_url, Some(&etag)).await;
        assert_eq!(cached.status().as_u16(), 304);
    }

    #[tokio::test]
    async fn hooks_require_content_permissions() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", &[]);

        let save = app
            .post_with_token(&routes::content_saved("post", "p1"), &json!({ "body": "" }), &token)
            .await;
        assert_eq!(save.status, 403);

        let delete = app
            .delete_with_token(&routes::content("post", "p1"), &token)
            .await;
        assert_eq!(delete.status, 403);
    }

    #[tokio::test]
    async fn delete_hook_cascades() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", WRITER);
        let asset = app.stage("u1", "a.png").await;
        app.post_with_token(
            &routes::content_saved("event", "e1"),
            &json!({ "body": format!("<img src=\"/files/{}\">", asset.storage_key) }),
            &token,
        )
        .await;

        let res = app
            .delete_with_token(&routes::content("event", "e1"), &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["deleted"][0], asset.id.to_string());
        assert!(app.all_assets().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_content_type_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", WRITER);

        let res = app
            .post_with_token(&routes::content_saved("wiki", "w1"), &json!({ "body": "" }), &token)
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn avatar_is_not_a_content_type() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", WRITER);

        let res = app
            .post_with_token(&routes::content_saved("avatar", "u1"), &json!({ "body": "" }), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod confirm_and_avatar {
    use super::*;

    #[tokio::test]
    async fn confirm_rejects_foreign_assets() {
        let app = TestApp::spawn().await;
        let theirs = app.stage("u2", "theirs.png").await;
        let token = app.token("u1", &[]);

        let res = app
            .post_with_token(
                routes::CONFIRM,
                &json!({ "asset_ids": [theirs.id] }),
                &token,
            )
            .await;

        assert_eq!(res.status, 403);
        assert!(app.find(theirs.id).await.is_some());
    }

    #[tokio::test]
    async fn confirm_into_entity() {
        let app = TestApp::spawn().await;
        let keep = app.stage("u1", "keep.png").await;
        let discard = app.stage("u1", "discard.png").await;
        let token = app.token("u1", &[]);

        let res = app
            .post_with_token(
                routes::CONFIRM,
                &json!({
                    "asset_ids": [keep.id],
                    "entity": { "entity_type": "report", "entity_id": "r1" },
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["kept"][0]["state"], "confirmed");
        assert_eq!(res.body["kept"][0]["entity"]["entity_type"], "report");
        assert_eq!(res.body["deleted"][0], discard.id.to_string());
    }

    #[tokio::test]
    async fn avatar_upload_replaces_previous() {
        let app = TestApp::spawn().await;
        let token = app.token("u1", &[]);

        let first = app
            .put_file_with_token(routes::AVATAR, "me.png", b"v1", &token)
            .await;
        assert_eq!(first.status, 200, "{}", first.text);
        let first_id = first.body["asset"]["id"].as_str().unwrap().to_string();

        let second = app
            .put_file_with_token(routes::AVATAR, "me2.png", b"v2", &token)
            .await;
        assert_eq!(second.status, 200);
        assert_eq!(second.body["superseded"][0], first_id);
        assert_eq!(app.all_assets().await.len(), 1);
    }
}

mod files {
    use super::*;

    #[tokio::test]
    async fn unknown_and_malformed_keys_are_not_found() {
        let app = TestApp::spawn().await;

        assert_eq!(
            app.get_without_token("/files/u1/temp/missing.png").await.status,
            404
        );
        assert_eq!(app.get_without_token("/files/not-a-key").await.status, 404);
    }
}

mod admin {
    use super::*;

    #[tokio::test]
    async fn sweep_requires_permission() {
        let app = TestApp::spawn().await;

        let denied = app
            .post_empty_with_token(routes::SWEEP, &app.token("u1", &[]))
            .await;
        assert_eq!(denied.status, 403);

        let allowed = app
            .post_empty_with_token(routes::SWEEP, &app.token("ops", &["asset:sweep"]))
            .await;
        assert_eq!(allowed.status, 200, "{}", allowed.text);
        assert!(allowed.body["expired"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_accepts_retention_override() {
        let app = TestApp::spawn().await;
        let asset = app.stage("u1", "a.png").await;
        app.backdate(asset.id, chrono::Utc::now() - chrono::Duration::seconds(120))
            .await;

        let res = app
            .post_empty_with_token(
                &format!("{}?retention_secs=60", routes::SWEEP),
                &app.token("ops", &["asset:sweep"]),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["expired"][0], asset.id.to_string());
    }
}
