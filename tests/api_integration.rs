//! API Integration Tests for the costume studio backend
//!
//! Tests the REST API endpoints using axum-test.
//! Uses in-memory SQLite and stub model services.

mod common;

use axum::http::{header::AUTHORIZATION, StatusCode};
use axum_test::multipart::MultipartForm;
use axum_test::TestServer;
use common::{bearer_auth, png, png_part, sign_up, spawn_app, PUBLIC_URL};
use serde_json::{json, Value};

/// Upload a photo, optionally as a signed-in user, and return the record.
async fn upload_photo(server: &TestServer, token: Option<&str>) -> Value {
    let form = MultipartForm::new()
        .add_part("upload_images", png_part("photo.png", png(8, 8, [200, 10, 10])));
    let mut request = server.post("/api/images").multipart(form);
    if let Some(token) = token {
        request = request.add_header(AUTHORIZATION, bearer_auth(token));
    }

    let response = request.await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

// ============================================================================
// Misc Routes
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "healthy");
}

#[tokio::test]
async fn test_root_redirects_to_api() {
    let app = spawn_app().await;

    for path in ["/", "/process"] {
        let response = app.server.get(path).await;
        assert_eq!(response.status_code(), StatusCode::FOUND);
        assert_eq!(response.header("location"), "/api/");
    }
}

#[tokio::test]
async fn test_trailing_slash_is_optional() {
    let app = spawn_app().await;
    upload_photo(&app.server, None).await;

    for path in ["/api/images", "/api/images/", "/api/", "/process/"] {
        let response = app.server.get(path).await;
        assert_ne!(response.status_code(), StatusCode::NOT_FOUND, "{} not routed", path);
    }

    let list: Value = app.server.get("/api/images/").await.json();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_api_root_lists_resources() {
    let app = spawn_app().await;

    let response = app.server.get("/api").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["images"], format!("{}/api/images/", PUBLIC_URL));
    assert_eq!(body["merged-images"], format!("{}/api/merged-images/", PUBLIC_URL));
}

// ============================================================================
// Users and Tokens
// ============================================================================

#[tokio::test]
async fn test_register_and_read_self() {
    let app = spawn_app().await;
    let (user_id, token) = sign_up(&app.server, "alice").await;

    let response = app
        .server
        .get("/api/user")
        .add_header(AUTHORIZATION, bearer_auth(&token))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], user_id);
    assert_eq!(body[0]["username"], "alice");
    assert!(body[0].get("password_hash").is_none());

    let response = app
        .server
        .get(&format!("/api/user/{}", user_id))
        .add_header(AUTHORIZATION, bearer_auth(&token))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_other_users_are_hidden() {
    let app = spawn_app().await;
    let (_, alice) = sign_up(&app.server, "alice").await;
    let (bob_id, _) = sign_up(&app.server, "bob").await;

    let response = app
        .server
        .get(&format!("/api/user/{}", bob_id))
        .add_header(AUTHORIZATION, bearer_auth(&alice))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_user_list_requires_auth() {
    let app = spawn_app().await;

    let response = app.server.get("/api/user").await;
    response.assert_status_unauthorized();

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_register_validation() {
    let app = spawn_app().await;
    sign_up(&app.server, "alice").await;

    let response = app
        .server
        .post("/api/user")
        .json(&json!({ "username": "alice", "password": "another-password" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    let response = app
        .server
        .post("/api/user")
        .json(&json!({ "username": "carol", "password": "short" }))
        .await;
    response.assert_status_bad_request();

    let response = app
        .server
        .post("/api/user")
        .json(&json!({ "username": "carol", "password": "long-enough", "email": "nope" }))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_token_pair_and_refresh() {
    let app = spawn_app().await;
    sign_up(&app.server, "alice").await;

    let response = app
        .server
        .post("/api/token")
        .json(&json!({ "username": "alice", "password": "correct-horse-battery" }))
        .await;
    response.assert_status_ok();
    let pair: Value = response.json();
    let refresh = pair["refresh"].as_str().unwrap();

    let response = app
        .server
        .post("/api/token/refresh")
        .json(&json!({ "refresh": refresh }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let access = body["access"].as_str().unwrap();

    let response = app
        .server
        .get("/api/user")
        .add_header(AUTHORIZATION, bearer_auth(access))
        .await;
    response.assert_status_ok();

    // A refresh token is not an access token
    let response = app
        .server
        .get("/api/user")
        .add_header(AUTHORIZATION, bearer_auth(refresh))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = spawn_app().await;
    sign_up(&app.server, "alice").await;

    let response = app
        .server
        .post("/api/token/obtain")
        .json(&json!({ "username": "alice", "password": "not-the-password" }))
        .await;
    response.assert_status_unauthorized();

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_invalid_token_rejected_on_anonymous_route() {
    let app = spawn_app().await;

    let response = app
        .server
        .get("/api/images")
        .add_header(AUTHORIZATION, bearer_auth("garbage"))
        .await;
    response.assert_status_unauthorized();
}

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_anonymous_upload_is_classified_and_served() {
    let app = spawn_app().await;

    let body = upload_photo(&app.server, None).await;
    assert_eq!(body["user"], Value::Null);
    assert_eq!(body["nation1"], "Miao");
    assert_eq!(body["nation2"], "Dai");
    assert_eq!(body["nation3"], "Yi");
    assert_eq!(body["modified_nation"], Value::Null);
    assert!(body["time_consuming"].as_str().unwrap().ends_with('s'));

    let url = body["upload_images"].as_str().unwrap();
    let prefix = format!("{}/media/upload_images/Miao/", PUBLIC_URL);
    assert!(url.starts_with(&prefix), "unexpected url {}", url);

    let response = app.server.get(url.trim_start_matches(PUBLIC_URL)).await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), png(8, 8, [200, 10, 10]).as_slice());

    let response = app.server.get("/api/images").await;
    response.assert_status_ok();
    let list: Value = response.json();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_extension_follows_image_bytes() {
    let app = spawn_app().await;

    let data = png(8, 8, [10, 200, 10]);
    let form =
        MultipartForm::new().add_part("upload_images", png_part("evil.html", data.clone()));
    let response = app.server.post("/api/images").multipart(form).await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();

    let url = body["upload_images"].as_str().unwrap();
    assert!(url.ends_with(".png"), "unexpected url {}", url);

    let response = app.server.get(url.trim_start_matches(PUBLIC_URL)).await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "image/png");
    assert_eq!(response.as_bytes().as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_upload_rejects_bad_input() {
    let app = spawn_app().await;

    let form = MultipartForm::new().add_text("something_else", "hello");
    let response = app.server.post("/api/images").multipart(form).await;
    response.assert_status_bad_request();

    let form = MultipartForm::new().add_part(
        "upload_images",
        axum_test::multipart::Part::bytes(b"not an image".to_vec())
            .file_name("notes.txt")
            .mime_type("text/plain"),
    );
    let response = app.server.post("/api/images").multipart(form).await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "INVALID_FILE_TYPE");
}

#[tokio::test]
async fn test_uploads_are_scoped_to_owner() {
    let app = spawn_app().await;
    let (_, alice) = sign_up(&app.server, "alice").await;
    let (_, bob) = sign_up(&app.server, "bob").await;

    let anonymous = upload_photo(&app.server, None).await;
    let owned = upload_photo(&app.server, Some(&alice)).await;
    assert_eq!(owned["user"], "alice");

    // Anonymous callers only see unowned uploads
    let list: Value = app.server.get("/api/images").await.json();
    let ids: Vec<i64> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![anonymous["id"].as_i64().unwrap()]);

    let response = app.server.get(&format!("/api/images/{}", owned["id"])).await;
    response.assert_status_not_found();

    // Signed-in users only see their own
    let response = app
        .server
        .get(&format!("/api/images/{}", anonymous["id"]))
        .add_header(AUTHORIZATION, bearer_auth(&alice))
        .await;
    response.assert_status_not_found();

    let response = app
        .server
        .get(&format!("/api/images/{}", owned["id"]))
        .add_header(AUTHORIZATION, bearer_auth(&bob))
        .await;
    response.assert_status_not_found();

    let response = app
        .server
        .get(&format!("/api/images/{}", owned["id"]))
        .add_header(AUTHORIZATION, bearer_auth(&alice))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_change_nation_and_user_assess() {
    let app = spawn_app().await;
    let upload = upload_photo(&app.server, None).await;
    let id = upload["id"].as_i64().unwrap();

    let response = app
        .server
        .get(&format!("/api/images/{}/change-nation", id))
        .add_query_param("name", "Dai")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["modified_nation"], "Dai");
    assert_eq!(body["nation1"], "Miao");

    // Same request again leaves the same record
    let again: Value = app
        .server
        .get(&format!("/api/images/{}/change-nation", id))
        .add_query_param("name", "Dai")
        .await
        .json();
    assert_eq!(again["modified_nation"], "Dai");

    let response = app
        .server
        .get(&format!("/api/images/{}/user-assess", id))
        .add_query_param("assess", "satisfied")
        .await;
    response.assert_status_ok();

    let response = app.server.get(&format!("/api/images/{}/change-nation", id)).await;
    response.assert_status_bad_request();

    let response = app.server.get(&format!("/api/images/{}/user-assess", id)).await;
    response.assert_status_bad_request();

    let response = app
        .server
        .get(&format!("/api/images/{}/user-assess", id))
        .add_query_param("assess", "x".repeat(51))
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_delete_upload() {
    let app = spawn_app().await;
    let upload = upload_photo(&app.server, None).await;
    let id = upload["id"].as_i64().unwrap();
    let path = upload["upload_images"]
        .as_str()
        .unwrap()
        .trim_start_matches(PUBLIC_URL)
        .to_string();

    let response = app.server.delete(&format!("/api/images/{}", id)).await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    app.server.get(&format!("/api/images/{}", id)).await.assert_status_not_found();
    app.server.get(&path).await.assert_status_not_found();
}

#[tokio::test]
async fn test_upload_used_by_merge_job_cannot_be_deleted() {
    let app = spawn_app().await;
    let (_, token) = sign_up(&app.server, "alice").await;
    let upload = upload_photo(&app.server, Some(&token)).await;
    let id = upload["id"].as_i64().unwrap();

    let form = MultipartForm::new().add_text("person_1_identification", id.to_string());
    let response = app
        .server
        .post("/api/merged-images")
        .add_header(AUTHORIZATION, bearer_auth(&token))
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);

    let response = app
        .server
        .delete(&format!("/api/images/{}", id))
        .add_header(AUTHORIZATION, bearer_auth(&token))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}
