use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use http_body_util::BodyExt;
use rust_image_backend::auth::session::{SessionCodec, SessionPayload};
use rust_image_backend::config::AppConfig;
use rust_image_backend::entities::users;
use rust_image_backend::infrastructure::database;
use rust_image_backend::services::storage::{BlobObject, MemoryBlobStorage};
use rust_image_backend::{AppState, create_app};
use sea_orm::{ActiveModelTrait, Database, Set};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

async fn setup_test_db() -> sea_orm::DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

struct TestContext {
    app: Router,
    state: AppState,
    storage: Arc<MemoryBlobStorage>,
}

async fn setup() -> TestContext {
    let db = setup_test_db().await;
    let storage = Arc::new(MemoryBlobStorage::new());
    let state = AppState::new(db, storage.clone(), AppConfig::development());
    let app = create_app(state.clone());
    TestContext {
        app,
        state,
        storage,
    }
}

async fn create_user(state: &AppState, email: &str) -> users::Model {
    users::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        email: Set(email.to_string()),
        name: Set(Some("Test User".to_string())),
        avatar_url: Set(None),
        provider: Set("github".to_string()),
        provider_id: Set("12345".to_string()),
        password_hash: Set(None),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
    }
    .insert(&state.db)
    .await
    .unwrap()
}

fn session_cookie_for(state: &AppState, user_id: &str, is_admin: bool) -> String {
    let codec = SessionCodec::new(&state.config.session_secret);
    let encoded = codec.encode(&SessionPayload::new(user_id, is_admin)).unwrap();
    format!("session={}", encoded)
}

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

fn multipart_body(parts: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (filename, content_type, data) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, cookie: Option<&str>, bearer: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_upload_list_stats_flow() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);

    // 2MB "JPEG"
    let body = multipart_body(&[("vacation.JPG", "image/jpeg", vec![0xFFu8; 2 * 1024 * 1024])]);
    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload", Some(&cookie), None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let uploaded = json_body(response).await;
    assert_eq!(uploaded["format"], "jpeg");
    assert_eq!(uploaded["size"], 2 * 1024 * 1024);
    let url = uploaded["url"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:3000/"));
    // 16-char key plus extension
    let key = url.rsplit('/').next().unwrap();
    assert_eq!(key.len(), 16 + 1 + 4);
    assert!(key.ends_with(".jpeg"));
    assert_eq!(ctx.storage.len(), 1);

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/images")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await;
    assert_eq!(listed["images"].as_array().unwrap().len(), 1);
    assert_eq!(listed["images"][0]["filename"], "vacation.JPG");
    assert_eq!(listed["images"][0]["mimeType"], "image/jpeg");

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/stats")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let stats = json_body(response).await;
    assert_eq!(stats["imageCount"], 1);
    assert_eq!(stats["totalSize"], 2 * 1024 * 1024);
}

#[tokio::test]
async fn test_missing_credentials_are_uniform_401() {
    let ctx = setup().await;

    for uri in ["/api/images", "/api/stats", "/api/upload-tokens"] {
        let response = ctx
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "GET {}", uri);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Unauthorized");
    }

    // Garbage cookie reads the same as no cookie
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/images")
                .header(header::COOKIE, "session=not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn test_tampered_session_is_rejected() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);

    // Corrupt one character in the middle of the token
    let mut tampered = cookie.clone().into_bytes();
    let mid = tampered.len() / 2;
    tampered[mid] = if tampered[mid] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, tampered)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oversized_upload_writes_nothing() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);

    let body = multipart_body(&[("big.jpg", "image/jpeg", vec![0u8; 11 * 1024 * 1024])]);
    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload", Some(&cookie), None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.storage.is_empty());
}

#[tokio::test]
async fn test_disallowed_type_rejected() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);

    let body = multipart_body(&[("notes.txt", "text/plain", b"hello".to_vec())]);
    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload", Some(&cookie), None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Unsupported file type"));
    assert!(ctx.storage.is_empty());
}

#[tokio::test]
async fn test_batch_upload_isolates_failures() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);

    let body = multipart_body(&[
        ("a.png", "image/png", vec![1u8; 100]),
        ("b.txt", "text/plain", vec![2u8; 100]),
        ("c.webp", "image/webp", vec![3u8; 100]),
    ]);
    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload/batch", Some(&cookie), None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let outcome = json_body(response).await;
    assert_eq!(outcome["uploaded"], 2);
    assert_eq!(outcome["failed"], 1);
    assert_eq!(outcome["errors"][0]["filename"], "b.txt");
    assert_eq!(ctx.storage.len(), 2);
}

#[tokio::test]
async fn test_batch_size_cap() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);

    let parts: Vec<(&str, &str, Vec<u8>)> =
        (0..21).map(|_| ("x.png", "image/png", vec![0u8; 10])).collect();
    let body = multipart_body(&parts);

    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload/batch", Some(&cookie), None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.storage.is_empty());
}

#[tokio::test]
async fn test_upload_token_lifecycle() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);

    // Issue a token over the API
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload-tokens")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"ci-uploader"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;
    let raw_token = created["token"].as_str().unwrap().to_string();
    let token_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(raw_token.len(), 48);

    // The token can upload
    let body = multipart_body(&[("from-ci.png", "image/png", vec![7u8; 64])]);
    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload", None, Some(&raw_token), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // ...but cannot manage tokens or trigger a sweep
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/upload-tokens")
                .header(header::AUTHORIZATION, format!("Bearer {}", raw_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/images/sync")
                .header(header::AUTHORIZATION, format!("Bearer {}", raw_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Revoke, then the token stops working entirely
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/upload-tokens/{}", token_id))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let body = multipart_body(&[("late.png", "image/png", vec![7u8; 64])]);
    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload", None, Some(&raw_token), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_token_via_custom_header() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let issued = ctx.state.registry.issue(&user.id, "header-client").await.unwrap();

    let body = multipart_body(&[("h.png", "image/png", vec![9u8; 32])]);
    let request = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("x-upload-token", &issued.token)
        .body(Body::from(body))
        .unwrap();

    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sync_requires_admin_session() {
    let ctx = setup().await;
    let user = create_user(&ctx.state, "alice@example.com").await;
    let plain_cookie = session_cookie_for(&ctx.state, &user.id, false);

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/images/sync")
                .header(header::COOKIE, &plain_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sync_adopts_external_blobs_once() {
    let ctx = setup().await;
    let admin = create_user(&ctx.state, "owner@example.com").await;
    let admin_cookie = session_cookie_for(&ctx.state, &admin.id, true);

    // Blob written by an external tool, with no upload metadata
    ctx.storage.insert_raw(BlobObject {
        key: "ExternalKey12345.png".to_string(),
        size: 512,
        last_modified: Utc::now(),
        content_type: Some("image/png".to_string()),
        metadata: HashMap::new(),
    });
    // And one non-image object the sweep must leave alone
    ctx.storage.insert_raw(BlobObject {
        key: "backup.tar".to_string(),
        size: 9999,
        last_modified: Utc::now(),
        content_type: Some("application/x-tar".to_string()),
        metadata: HashMap::new(),
    });

    let sync = |cookie: String| {
        let app = ctx.app.clone();
        async move {
            let response = app
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/images/sync")
                        .header(header::COOKIE, cookie)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            json_body(response).await
        }
    };

    // Counters live under `stats` with an error count; the messages
    // themselves are a flat top-level list
    let report = sync(admin_cookie.clone()).await;
    assert_eq!(report["stats"]["total"], 2);
    assert_eq!(report["stats"]["added"], 1);
    assert_eq!(report["stats"]["skipped"], 1);
    assert_eq!(report["stats"]["errors"], 0);
    assert_eq!(report["errors"].as_array().unwrap().len(), 0);

    // Second sweep changes nothing
    let report = sync(admin_cookie.clone()).await;
    assert_eq!(report["stats"]["added"], 0);
    assert_eq!(report["stats"]["skipped"], 2);

    // The adopted blob belongs to the acting admin
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/images")
                .header(header::COOKIE, &admin_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed = json_body(response).await;
    assert_eq!(listed["images"].as_array().unwrap().len(), 1);
    assert_eq!(listed["images"][0]["filename"], "ExternalKey12345.png");
}

#[tokio::test]
async fn test_images_are_owner_scoped() {
    let ctx = setup().await;
    let alice = create_user(&ctx.state, "alice@example.com").await;
    let bob = create_user(&ctx.state, "bob@example.com").await;
    let alice_cookie = session_cookie_for(&ctx.state, &alice.id, false);
    let bob_cookie = session_cookie_for(&ctx.state, &bob.id, false);

    let body = multipart_body(&[("private.png", "image/png", vec![5u8; 256])]);
    let response = ctx
        .app
        .clone()
        .oneshot(upload_request("/api/upload", Some(&alice_cookie), None, body))
        .await
        .unwrap();
    let uploaded = json_body(response).await;
    let image_id = uploaded["id"].as_str().unwrap().to_string();

    // Bob sees neither the detail nor the delete
    for method in ["GET", "DELETE"] {
        let response = ctx
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(format!("/api/images/{}", image_id))
                    .header(header::COOKIE, &bob_cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", method);
    }
    assert_eq!(ctx.storage.len(), 1);

    // Alice can delete, which also removes the blob
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/images/{}", image_id))
                .header(header::COOKIE, &alice_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(ctx.storage.is_empty());
}

#[tokio::test]
async fn test_password_login_is_owner_only() {
    let ctx = setup().await;

    // Not the configured owner: uniform 401
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/password-login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"email":"mallory@example.com","password":"whatever-pass"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // First owner login provisions the account and sets a cookie
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/password-login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"email":"owner@example.com","password":"correct horse battery"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    let body = json_body(response).await;
    assert_eq!(body["isAdmin"], true);

    // Wrong password on the now-provisioned account
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/password-login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"email":"owner@example.com","password":"wrong password!"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The issued cookie authenticates
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = json_body(response).await;
    assert_eq!(me["email"], "owner@example.com");
}

#[tokio::test]
async fn test_auth_status_is_always_200() {
    let ctx = setup().await;

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["authenticated"], false);

    let user = create_user(&ctx.state, "alice@example.com").await;
    let cookie = session_cookie_for(&ctx.state, &user.id, false);
    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/status")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let ctx = setup().await;

    let response = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("session="));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = setup().await;

    let response = ctx
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
}
