use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub image_path: String,
    pub image_name: String,
    pub description: String,
    pub room_category: Option<String>,
    pub content_hash: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Amenity {
    pub id: i64,
    pub image_id: i64,
    pub room_type: String,
    pub amenity_name: String,
    pub is_present: bool,
}

/// One row of the per-image summary report.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image_path: String,
    pub description: String,
    pub amenity_count: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AmenityFrequency {
    pub amenity_name: String,
    pub image_count: i64,
}
