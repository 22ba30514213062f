//! Shared setup for the HTTP integration tests.
//!
//! Builds the full application on an in-memory database and a temporary
//! media root, with the model and face-merge services replaced by stubs.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderValue;
use axum_test::multipart::Part;
use axum_test::TestServer;
use costume_studio::api;
use costume_studio::config::{
    AuthConfig, Config, DatabaseConfig, FaceApiConfig, LogConfig, LogFormat, MediaConfig,
    ModelConfig, ServerConfig,
};
use costume_studio::db::{self, DbPool};
use costume_studio::services::{Classifier, FaceMerger, ScoredLabel, Segmenter};
use costume_studio::state::Backends;
use costume_studio::{AppState, Result};
use image::{Rgb, RgbImage, RgbaImage};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const PUBLIC_URL: &str = "http://localhost:8000";

/// Helper function to create a Bearer Authorization header value
pub fn bearer_auth(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

// ============================================================================
// Service Stubs
// ============================================================================

/// Always predicts the same four labels.
pub struct StubClassifier;

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _image: &[u8]) -> Result<Vec<ScoredLabel>> {
        Ok(vec![
            ScoredLabel { label: "Dai".into(), score: 0.05 },
            ScoredLabel { label: "Miao".into(), score: 0.9 },
            ScoredLabel { label: "Bai".into(), score: 0.01 },
            ScoredLabel { label: "Yi".into(), score: 0.04 },
        ])
    }
}

/// Returns the costume photo unchanged and counts calls.
#[derive(Default)]
pub struct StubFaceMerger {
    pub calls: AtomicUsize,
}

impl StubFaceMerger {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceMerger for StubFaceMerger {
    async fn merge_face(&self, template: &[u8], _extract: &[u8], _rate: u8) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(template.to_vec())
    }
}

/// Treats the whole photo as the person.
pub struct StubSegmenter;

#[async_trait]
impl Segmenter for StubSegmenter {
    async fn segment(&self, image: &[u8]) -> Result<RgbaImage> {
        Ok(image::load_from_memory(image)?.to_rgba8())
    }
}

// ============================================================================
// Test Setup Helpers
// ============================================================================

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub db: DbPool,
    pub face: Arc<StubFaceMerger>,
    pub media_dir: TempDir,
}

fn test_config(media_root: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            public_url: PUBLIC_URL.to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
        },
        media: MediaConfig {
            root: media_root.to_string(),
            url_prefix: "/media/".to_string(),
            max_upload_size: 1024 * 1024,
        },
        face_api: FaceApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "test-key".to_string(),
            api_secret: "test-secret".to_string(),
            merge_rate: 100,
        },
        models: ModelConfig {
            humanseg_url: "http://127.0.0.1:9/humanseg".to_string(),
            classifier_url: "http://127.0.0.1:9/classifier".to_string(),
            timeout_secs: 5,
        },
        auth: AuthConfig {
            jwt_secret: "integration-test-secret".to_string(),
            access_ttl_seconds: 3600,
            refresh_ttl_seconds: 86400,
        },
        log: LogConfig {
            format: LogFormat::Pretty,
        },
    }
}

/// Build the application with stubbed services.
pub async fn spawn_app() -> TestApp {
    let media_dir = tempfile::tempdir().expect("Failed to create media dir");
    let config = test_config(&media_dir.path().to_string_lossy());

    let pool = db::init_pool(":memory:")
        .await
        .expect("Failed to create test database");
    db::initialize_schema(&pool)
        .await
        .expect("Failed to initialize schema");

    let face = Arc::new(StubFaceMerger::default());
    let backends = Backends {
        classifier: Arc::new(StubClassifier),
        face: face.clone(),
        segmenter: Arc::new(StubSegmenter),
    };

    let state = AppState::from_parts(pool.clone(), &config, backends);
    let server =
        TestServer::new(api::app(state.clone())).expect("Failed to create test server");

    TestApp {
        server,
        state,
        db: pool,
        face,
        media_dir,
    }
}

/// Register a user and return their ID and an access token.
pub async fn sign_up(server: &TestServer, username: &str) -> (i64, String) {
    let password = "correct-horse-battery";

    let response = server
        .post("/api/user")
        .json(&json!({ "username": username, "password": password }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .post("/api/token/obtain")
        .json(&json!({ "username": username, "password": password }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    (
        body["id"].as_i64().unwrap(),
        body["token"].as_str().unwrap().to_string(),
    )
}

/// Encode a solid-colour PNG.
pub fn png(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    let mut buf = Vec::new();
    RgbImage::from_pixel(width, height, Rgb(colour))
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// A PNG file part for a multipart form.
pub fn png_part(filename: &str, data: Vec<u8>) -> Part {
    Part::bytes(data).file_name(filename).mime_type("image/png")
}
