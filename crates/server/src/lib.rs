//! HTTP API and single-page UI over a shared `PropertyAmenitySystem`.

use amenity_core::imaging;
use amenity_core::models::RoomAmenities;
use amenity_core::PropertyAmenitySystem;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "Property Amenity Detection API";

const INDEX_HTML: &str = include_str!("../assets/index.html");
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    system: Arc<PropertyAmenitySystem>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub image_id: String,
    pub amenities: RoomAmenities,
    pub description: String,
    /// Seconds spent detecting and storing.
    pub processing_time: f64,
}

pub fn router(system: Arc<PropertyAmenitySystem>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api", get(api_root))
        .route("/api/amenities/health", get(health))
        .route("/api/amenities/detect", post(detect))
        .route("/api/amenities/results", get(results))
        .route("/api/amenities/results.csv", get(results_csv))
        .route("/api/amenities/summary", get(summary))
        .route("/api/amenities/frequencies", get(frequencies))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(AppState { system })
}

pub async fn serve(system: Arc<PropertyAmenitySystem>, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(system))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn api_root() -> Json<Value> {
    Json(json!({ "status": "active", "service": SERVICE_NAME }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

async fn detect(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<DetectResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = upload_file_name(field.file_name());
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
        upload = Some((file_name, content_type, bytes));
        break;
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;
    let declared_image = content_type
        .as_deref()
        .map(|ct| ct.starts_with("image/"))
        .unwrap_or(true);
    if !declared_image || !imaging::looks_like_image(&bytes) {
        return Err(ApiError::BadRequest("File must be an image".to_string()));
    }

    let image_id = Uuid::new_v4().to_string();
    let image_name = format!("{}_{}", image_id, file_name);
    let start = Instant::now();
    let (detection, _) = state
        .system
        .process_image_bytes(&bytes, &image_name)
        .await
        .map_err(|e| {
            error!("error processing image: {:#}", e);
            ApiError::Internal(format!("Error processing image: {:#}", e))
        })?;

    Ok(Json(DetectResponse {
        image_id,
        amenities: detection.amenities_by_room,
        description: detection.description,
        processing_time: start.elapsed().as_secs_f64(),
    }))
}

/// Last path component of a client-supplied name, so the id prefix survives storage.
fn upload_file_name(raw: Option<&str>) -> String {
    raw.and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("upload.jpg")
        .to_string()
}

async fn results(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "results": state.system.all_results().await }))
}

async fn results_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let bytes = state
        .system
        .data()
        .csv_export()
        .await
        .map_err(|e| ApiError::Internal(format!("Error getting results: {:#}", e)))?
        .unwrap_or_default();
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"amenities.csv\""),
        ],
        bytes,
    )
        .into_response())
}

async fn summary(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "summary": state.system.results_summary().await }))
}

async fn frequencies(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let frequencies = state
        .system
        .amenity_frequencies()
        .await
        .map_err(|e| ApiError::Internal(format!("Error getting frequencies: {:#}", e)))?;
    Ok(Json(json!({ "frequencies": frequencies })))
}
