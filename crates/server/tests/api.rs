use amenity_core::config::AppConfig;
use amenity_core::PropertyAmenitySystem;
use amenity_server::router;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
use providers::{ProviderError, VisionProvider, VisionRequest, VisionResponse};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "amenity-test-boundary";

struct PoolOnly;

#[async_trait]
impl VisionProvider for PoolOnly {
    fn name(&self) -> &str {
        "pool-only"
    }

    async fn generate(&self, request: &VisionRequest) -> Result<VisionResponse, ProviderError> {
        let text = if request.prompt.starts_with("This is an image") {
            r#"{"pool": true, "garden": "yes"}"#
        } else {
            "A lovely garden with a pool."
        };
        Ok(VisionResponse {
            text: text.to_string(),
            model: None,
        })
    }
}

struct Broken;

#[async_trait]
impl VisionProvider for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn generate(&self, _request: &VisionRequest) -> Result<VisionResponse, ProviderError> {
        Err(ProviderError::RequestFailed("connection refused".into()))
    }
}

async fn app(provider: Arc<dyn VisionProvider>) -> (Router, TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.output.directory = temp.path().join("out").to_string_lossy().into_owned();
    let system = PropertyAmenitySystem::with_provider(cfg, provider).await.unwrap();
    (router(Arc::new(system)), temp)
}

fn png() -> Vec<u8> {
    let img = ImageBuffer::from_pixel(12, 12, Rgb([0u8, 120, 255]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn multipart(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri("/api/amenities/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn status_endpoints() {
    let (app, _temp) = app(Arc::new(PoolOnly)).await;

    let (status, body) = get(&app, "/api").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "active");
    assert_eq!(body["service"], "Property Amenity Detection API");

    let (_, body) = get(&app, "/api/amenities/health").await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");

    let (status, html) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(html).unwrap().contains("/api/amenities/detect"));
}

#[tokio::test]
async fn detect_then_list_results() {
    let (app, temp) = app(Arc::new(PoolOnly)).await;

    let (status, body) = send_json(&app, multipart("file", "yard.png", "image/png", &png())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let image_id = body["image_id"].as_str().unwrap().to_string();
    assert_eq!(image_id.len(), 36);
    assert_eq!(body["amenities"]["outdoor"]["pool"], true);
    assert_eq!(body["amenities"]["outdoor"]["garden"], true);
    assert_eq!(body["amenities"]["kitchen"]["oven"], false);
    assert_eq!(body["description"], "A lovely garden with a pool.");
    assert!(body["processing_time"].as_f64().unwrap() >= 0.0);

    let (_, results) = send_json(
        &app,
        Request::builder()
            .uri("/api/amenities/results")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let rows = results["results"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["image_name"], format!("{image_id}_yard.png"));
    assert_eq!(rows[0]["pool"], 1);
    assert_eq!(rows[0]["room_category"], "outdoor");

    let (_, freq) = get(&app, "/api/amenities/frequencies").await;
    let freq: Value = serde_json::from_slice(&freq).unwrap();
    assert_eq!(freq["frequencies"].as_array().unwrap().len(), 2);

    let (_, summary) = get(&app, "/api/amenities/summary").await;
    let summary: Value = serde_json::from_slice(&summary).unwrap();
    assert_eq!(summary["summary"][0]["amenity_count"], 2);

    let (status, csv) = get(&app, "/api/amenities/results.csv").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(csv).unwrap().starts_with("image_name,image_path,room_category"));

    let temp_dir = temp.path().join("out").join("temp");
    assert_eq!(std::fs::read_dir(&temp_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn uploads_with_directory_names_keep_separate_records() {
    let (app, temp) = app(Arc::new(PoolOnly)).await;

    let mut ids = Vec::new();
    for _ in 0..2 {
        let (status, body) = send_json(&app, multipart("file", "photos/yard.png", "image/png", &png())).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        ids.push(body["image_id"].as_str().unwrap().to_string());
    }
    assert_ne!(ids[0], ids[1]);

    let (_, results) = get(&app, "/api/amenities/results").await;
    let results: Value = serde_json::from_slice(&results).unwrap();
    let mut names: Vec<String> = results["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["image_name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    let mut expected: Vec<String> = ids.iter().map(|id| format!("{id}_yard.png")).collect();
    expected.sort();
    assert_eq!(names, expected);

    let temp_dir = temp.path().join("out").join("temp");
    assert_eq!(std::fs::read_dir(&temp_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn rejects_non_images_and_missing_file() {
    let (app, _temp) = app(Arc::new(PoolOnly)).await;

    let (status, body) = send_json(&app, multipart("file", "notes.txt", "text/plain", b"hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "File must be an image");

    let (status, _) = send_json(&app, multipart("file", "fake.png", "image/png", b"hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
    let (status, body) = send_json(&app, multipart("file", "anim.gif", "image/gif", gif)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "File must be an image");

    let (status, body) = send_json(&app, multipart("other", "yard.png", "image/png", &png())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "No file provided");
}

#[tokio::test]
async fn model_failure_is_a_server_error() {
    let (app, _temp) = app(Arc::new(Broken)).await;
    let (status, body) = send_json(&app, multipart("file", "yard.png", "image/png", &png())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Error processing image"));

    let (_, results) = get(&app, "/api/amenities/results").await;
    let results: Value = serde_json::from_slice(&results).unwrap();
    assert!(results["results"].as_array().unwrap().is_empty());
}
