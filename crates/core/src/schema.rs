//! Amenity vocabulary grouped by room category.

use crate::config::SchemaConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON schema: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML schema: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("schema has no amenities")]
    Empty,
}

const DEFAULT_ROOMS: &[(&str, &[&str])] = &[
    (
        "kitchen",
        &[
            "refrigerator", "fridge", "oven", "microwave", "dishwasher", "sink", "stove",
            "toaster", "blender", "kettle", "coffee_maker", "cutlery", "utensils", "plates",
            "bowls", "bar_counter", "washing_machine",
        ],
    ),
    (
        "living_room",
        &[
            "sofa", "tv", "coffee_table", "bookshelf", "fireplace", "armchair",
            "entertainment_center", "speaker_system", "gaming_console", "air_conditioner",
            "ceiling_fan", "smart_home_system", "projector",
        ],
    ),
    (
        "bedroom",
        &[
            "bed", "wardrobe", "dresser", "nightstand", "desk", "chair", "tv", "mirror",
            "air_conditioner", "ceiling_fan", "lamp", "alarm_clock",
        ],
    ),
    (
        "bathroom",
        &[
            "toilet", "shower", "bathtub", "sink", "mirror", "towel_rack", "hair_dryer",
            "washing_machine", "dryer",
        ],
    ),
    (
        "outdoor",
        &[
            "patio", "balcony", "garden", "pool", "hot_tub", "bbq_grill", "outdoor_furniture",
            "parking_space",
        ],
    ),
    (
        "common",
        &[
            "wifi", "heating", "air_conditioning", "smoke_detector", "security_camera",
            "elevator", "wheelchair_accessible",
        ],
    ),
];

/// Immutable `room → amenities` mapping. Room order is preserved from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmenitySchema {
    rooms: IndexMap<String, Vec<String>>,
}

impl Default for AmenitySchema {
    fn default() -> Self {
        let rooms = DEFAULT_ROOMS
            .iter()
            .map(|(room, amenities)| {
                (
                    room.to_string(),
                    amenities.iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect();
        Self { rooms }
    }
}

impl AmenitySchema {
    /// Normalizes every name and drops duplicates within a room.
    pub fn from_rooms(rooms: IndexMap<String, Vec<String>>) -> Result<Self, SchemaError> {
        let mut normalized: IndexMap<String, Vec<String>> = IndexMap::new();
        for (room, amenities) in rooms {
            let room = normalize_name(&room);
            if room.is_empty() {
                continue;
            }
            let entry = normalized.entry(room).or_default();
            for amenity in amenities {
                let amenity = normalize_name(&amenity);
                if !amenity.is_empty() && !entry.contains(&amenity) {
                    entry.push(amenity);
                }
            }
        }
        normalized.retain(|_, amenities| !amenities.is_empty());
        if normalized.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self { rooms: normalized })
    }

    /// Reads a JSON object (or a TOML table when the extension is `.toml`).
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let rooms: IndexMap<String, Vec<String>> = if is_toml {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Self::from_rooms(rooms)
    }

    pub fn rooms(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.rooms.iter().map(|(r, a)| (r.as_str(), a.as_slice()))
    }

    pub fn room_names(&self) -> Vec<&str> {
        self.rooms.keys().map(String::as_str).collect()
    }

    pub fn amenities(&self, room: &str) -> Option<&[String]> {
        self.rooms.get(room).map(Vec::as_slice)
    }

    /// Flattened, de-duplicated, sorted vocabulary.
    pub fn all_amenities(&self) -> Vec<String> {
        self.rooms
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn contains(&self, amenity: &str) -> bool {
        self.rooms.values().any(|a| a.iter().any(|x| x == amenity))
    }
}

/// `"Coffee Maker"`, `"coffee-maker"` and `"coffee\_maker"` all become `coffee_maker`.
pub fn normalize_name(raw: &str) -> String {
    raw.replace("\\_", "_")
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Falls back to the built-in schema when the configured file can't be used.
pub fn load_schema(cfg: &SchemaConfig) -> AmenitySchema {
    if !cfg.from_file {
        return AmenitySchema::default();
    }
    let Some(path) = cfg.file_path.as_deref() else {
        error!("amenity_schema.from_file is set without file_path. Using default schema.");
        return AmenitySchema::default();
    };
    match AmenitySchema::from_file(Path::new(path)) {
        Ok(schema) => {
            info!(path, rooms = schema.rooms.len(), "loaded amenity schema");
            schema
        }
        Err(e) => {
            error!(path, "error loading amenity schema: {}. Using default schema.", e);
            AmenitySchema::default()
        }
    }
}
