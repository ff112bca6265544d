#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use quill::config::{AppConfig, DEFAULT_GEMINI_API_URL};
use quill::mail::Mailer;
use quill::repo::inmem::InMemRepo;
use quill::routes::{config, AppState};
use quill::storage::FsFileStore;
use quill::summary::Summarizer;
use serial_test::serial;
use std::path::Path;
use std::sync::Arc;

// Helper to ensure JWT secret present & unique temp data dir per test
fn setup_env() -> tempfile::TempDir {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("QUILL_DATA_DIR", tmp.path().to_str().unwrap());
    tmp
}

fn test_config(upload_dir: &Path) -> AppConfig {
    AppConfig {
        port: 0,
        public_base_url: "http://localhost:8080".into(),
        upload_dir: upload_dir.to_path_buf(),
        allowed_extensions: ["png", "jpg", "jpeg", "gif", "webp"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        frontend_url: None,
        mail: None,
        gemini_api_key: None,
        gemini_api_url: DEFAULT_GEMINI_API_URL.into(),
    }
}

fn test_state(tmp: &tempfile::TempDir) -> AppState {
    let cfg = test_config(&tmp.path().join("uploads"));
    AppState {
        repo: Arc::new(InMemRepo::new()),
        files: Arc::new(FsFileStore::new(cfg.upload_dir.clone()).unwrap()),
        mailer: Arc::new(Mailer::disabled()),
        summarizer: Arc::new(Summarizer::new(None, cfg.gemini_api_url.clone())),
        config: Arc::new(cfg),
    }
}

async fn register_and_login(
    app: &impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    >,
    username: &str,
    email: &str,
) -> String {
    let req = test::TestRequest::post()
        .uri("/api/register")
        .set_json(&serde_json::json!({
            "username": username,
            "email": email,
            "password": "hunter22"
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    body["token"].as_str().unwrap().to_string()
}

// Helper to build a multipart body with provided bytes and filename
fn build_multipart(file_name: &str, bytes: &[u8], boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    let disp = format!("--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n", boundary, file_name);
    body.extend_from_slice(disp.as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

// Minimal 1x1 PNG (transparent)
fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

#[actix_web::test]
#[serial]
async fn test_register_login_post_flow() {
    let tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(test_state(&tmp)))
            .configure(config),
    )
    .await;

    let token = register_and_login(&app, "alice", "alice@example.com").await;

    // listing posts requires a bearer token
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 0);

    // create post
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&serde_json::json!({
            "title": "Hello, World!",
            "content": "**bold** words",
            "tags": ["intro"]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(post["slug"], "hello-world");
    assert_eq!(post["author"], "alice");
    assert_eq!(post["parsed_content"], "<strong>bold</strong> words");

    // public read, no token
    let req = test::TestRequest::get().uri("/post/hello-world").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let public: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(public["title"], "Hello, World!");

    // public index, no token
    let req = test::TestRequest::get().uri("/").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let index: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(index.as_array().unwrap().len(), 1);

    // update own post
    let req = test::TestRequest::put()
        .uri("/api/posts/hello-world")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&serde_json::json!({
            "title": "Hello, World!",
            "content": "edited",
            "tags": []
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let updated: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(updated["content"], "edited");
    assert_eq!(updated["slug"], "hello-world");

    // missing title is rejected
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&serde_json::json!({"title": "   ", "content": "x"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn test_only_the_author_can_edit_or_delete() {
    let tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(test_state(&tmp)))
            .configure(config),
    )
    .await;

    let alice = register_and_login(&app, "alice", "alice@example.com").await;
    let mallory = register_and_login(&app, "mallory", "mallory@example.com").await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {}", alice)))
        .set_json(&serde_json::json!({"title": "Mine", "content": "original"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    // Someone else cannot edit...
    let req = test::TestRequest::put()
        .uri("/api/posts/mine")
        .insert_header(("Authorization", format!("Bearer {}", mallory)))
        .set_json(&serde_json::json!({"title": "Stolen", "content": "defaced"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // ...or delete.
    let req = test::TestRequest::delete()
        .uri("/api/posts/mine")
        .insert_header(("Authorization", format!("Bearer {}", mallory)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // The post is untouched.
    let req = test::TestRequest::get().uri("/post/mine").to_request();
    let resp = test::call_service(&app, req).await;
    let post: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(post["title"], "Mine");
    assert_eq!(post["content"], "original");

    // The author can delete.
    let req = test::TestRequest::delete()
        .uri("/api/posts/mine")
        .insert_header(("Authorization", format!("Bearer {}", alice)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::get().uri("/post/mine").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_login_failures_share_one_message() {
    let tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(test_state(&tmp)))
            .configure(config),
    )
    .await;

    register_and_login(&app, "alice", "alice@example.com").await;

    for body in [
        serde_json::json!({"username": "alice", "password": "wrongpass"}),
        serde_json::json!({"username": "nobody", "password": "whatever1"}),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/login")
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        let err: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(err["error"], "Invalid credentials");
    }
}

#[actix_web::test]
#[serial]
async fn test_registration_validation() {
    let tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(test_state(&tmp)))
            .configure(config),
    )
    .await;

    register_and_login(&app, "alice", "alice@example.com").await;

    let cases = [
        (
            serde_json::json!({"username": "ab", "email": "ok@example.com", "password": "hunter22"}),
            "Username must be at least 3 characters long",
        ),
        (
            serde_json::json!({"username": "bob", "email": "not-an-email", "password": "hunter22"}),
            "Invalid email address",
        ),
        (
            serde_json::json!({"username": "bob", "email": "bob@example.com", "password": "short"}),
            "Password must be at least 6 characters long",
        ),
        (
            serde_json::json!({"username": "alice", "email": "new@example.com", "password": "hunter22"}),
            "Username already exists",
        ),
        (
            serde_json::json!({"username": "bob", "email": "alice@example.com", "password": "hunter22"}),
            "Email already registered",
        ),
    ];
    for (body, expected) in cases {
        let req = test::TestRequest::post()
            .uri("/api/register")
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let err: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(err["error"], expected);
    }
}

#[actix_web::test]
#[serial]
async fn test_upload_roundtrip_and_rejections() {
    let tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(test_state(&tmp)))
            .configure(config),
    )
    .await;

    let token = register_and_login(&app, "alice", "alice@example.com").await;

    // upload a real PNG
    let (ctype, body) = build_multipart("cat photo.png", &sample_png(), "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/upload_image")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", ctype))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let uploaded: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let url = uploaded["url"].as_str().unwrap();
    assert_eq!(url, "/uploads/cat_photo.png");

    // fetch it back through the public route
    let req = test::TestRequest::get().uri(url).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("Content-Type").unwrap(),
        "image/png"
    );
    let bytes = test::read_body(resp).await;
    assert_eq!(bytes.as_ref(), sample_png().as_slice());

    // uploads require a token
    let (ctype, body) = build_multipart("cat.png", &sample_png(), "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/upload_image")
        .insert_header(("Content-Type", ctype))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // disallowed extension
    let (ctype, body) = build_multipart("page.svg", &sample_png(), "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/upload_image")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", ctype))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // right extension, non-image bytes
    let (ctype, body) = build_multipart("fake.png", b"not an image at all", "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/upload_image")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(("Content-Type", ctype))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // unknown upload 404s
    let req = test::TestRequest::get().uri("/uploads/missing.png").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_summary_unavailable_without_api_key() {
    let tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(test_state(&tmp)))
            .configure(config),
    )
    .await;

    let token = register_and_login(&app, "alice", "alice@example.com").await;
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&serde_json::json!({"title": "Long Read", "content": "plenty of words here"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::get()
        .uri("/post/long-read/summary")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
    let err: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(err["error"], "AI service not available");

    // unknown slug is 404 before the capability check matters
    let req = test::TestRequest::get().uri("/post/none/summary").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_forgot_password_is_noncommittal_for_unknown_email() {
    let tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(test_state(&tmp)))
            .configure(config),
    )
    .await;

    register_and_login(&app, "alice", "alice@example.com").await;

    // Unknown address: generic acknowledgement.
    let req = test::TestRequest::post()
        .uri("/api/forgot_password")
        .set_json(&serde_json::json!({"email": "nobody@example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(body["message"].as_str().unwrap().contains("If that email"));

    // Known address with no mail transport: the send fails loudly.
    let req = test::TestRequest::post()
        .uri("/api/forgot_password")
        .set_json(&serde_json::json!({"email": "alice@example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
}
