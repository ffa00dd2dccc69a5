use crate::schema::AmenitySchema;
use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// `room → (amenity → present)`, covering every schema entry.
pub type RoomAmenities = IndexMap<String, BTreeMap<String, bool>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub amenities_by_room: RoomAmenities,
    /// Flat presence map restricted to the vocabulary.
    pub detected: BTreeMap<String, bool>,
    pub description: String,
}

impl Detection {
    pub fn present(&self) -> BTreeSet<String> {
        self.detected
            .iter()
            .filter(|(_, present)| **present)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Rooms with at least one present amenity, in schema order.
    pub fn present_by_room(&self) -> IndexMap<String, Vec<String>> {
        self.amenities_by_room
            .iter()
            .filter_map(|(room, amenities)| {
                let present: Vec<String> = amenities
                    .iter()
                    .filter(|(_, p)| **p)
                    .map(|(a, _)| a.clone())
                    .collect();
                (!present.is_empty()).then(|| (room.clone(), present))
            })
            .collect()
    }

    /// Room with the most present amenities; earlier rooms win ties.
    pub fn room_category(&self) -> Option<String> {
        let mut best: Option<(&str, usize)> = None;
        for (room, amenities) in &self.amenities_by_room {
            let count = amenities.values().filter(|p| **p).count();
            if count > best.map(|(_, c)| c).unwrap_or(0) {
                best = Some((room, count));
            }
        }
        best.map(|(room, _)| room.to_string())
    }
}

/// Lays the model's flat answer over the schema. Unknown names never reach the result.
pub fn restructure(schema: &AmenitySchema, detected: &BTreeMap<String, bool>) -> Detection {
    let mut amenities_by_room = RoomAmenities::new();
    let mut flat = BTreeMap::new();
    for (room, amenities) in schema.rooms() {
        let entry = amenities_by_room.entry(room.to_string()).or_default();
        for amenity in amenities {
            let present = detected.get(amenity).copied().unwrap_or(false);
            entry.insert(amenity.clone(), present);
            let slot = flat.entry(amenity.clone()).or_insert(false);
            *slot |= present;
        }
    }
    Detection {
        amenities_by_room,
        detected: flat,
        description: String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub image_name: String,
    pub image_path: String,
    pub room_category: Option<String>,
    pub detected_amenities: BTreeSet<String>,
    pub description: String,
    pub processed_at: DateTime<Utc>,
    pub content_hash: Option<String>,
}

impl DetectionRecord {
    pub fn new(path: &Path, detection: &Detection, content_hash: Option<String>) -> Self {
        Self {
            image_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            image_path: path.to_string_lossy().into_owned(),
            room_category: detection.room_category(),
            detected_amenities: detection.present(),
            description: detection.description.clone(),
            processed_at: now(),
            content_hash,
        }
    }
}

/// Microsecond precision so timestamps survive the text stores unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
