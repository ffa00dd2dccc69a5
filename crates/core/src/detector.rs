use crate::config::ModelConfig;
use crate::error::DetectError;
use crate::imaging;
use crate::models::{restructure, Detection};
use crate::parser;
use crate::schema::AmenitySchema;
use indexmap::IndexMap;
use providers::{ImageInput, Sampling, VisionProvider, VisionRequest};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task;
use tracing::{debug, error, info};

pub const NO_AMENITIES_DESCRIPTION: &str = "No notable amenities were detected in this property.";

const DETECT_FOLLOW_UP: &str = "Please follow the prompt and generate JSON like output.";
const DESCRIBE_FOLLOW_UP: &str = "Please describe the property in highlighting the amenities.";

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub max_image_size: u32,
    pub detect_max_tokens: u32,
    pub describe_max_tokens: u32,
}

impl From<&ModelConfig> for DetectorSettings {
    fn from(cfg: &ModelConfig) -> Self {
        Self {
            max_image_size: cfg.max_image_size,
            detect_max_tokens: cfg.detect_max_tokens,
            describe_max_tokens: cfg.describe_max_tokens,
        }
    }
}

/// Prompts a hosted VLM for amenity presence and a listing description.
pub struct AmenityDetector {
    provider: Arc<dyn VisionProvider>,
    schema: Arc<AmenitySchema>,
    settings: DetectorSettings,
}

impl AmenityDetector {
    pub fn new(
        provider: Arc<dyn VisionProvider>,
        schema: Arc<AmenitySchema>,
        settings: DetectorSettings,
    ) -> Self {
        info!(provider = provider.name(), "initializing amenity detector");
        Self {
            provider,
            schema,
            settings,
        }
    }

    pub fn schema(&self) -> &AmenitySchema {
        &self.schema
    }

    pub async fn detect_bytes(&self, bytes: Vec<u8>) -> Result<Detection, DetectError> {
        let max_side = self.settings.max_image_size;
        let image = task::spawn_blocking(move || imaging::prepare(&bytes, max_side)).await??;

        let detected = self.detect_amenities(&image).await?;
        let mut detection = restructure(&self.schema, &detected);
        detection.description = self
            .generate_description(&image, &detection.present_by_room())
            .await?;
        Ok(detection)
    }

    /// Flat presence map restricted to the vocabulary. Unparsable answers yield an empty map.
    pub async fn detect_amenities(
        &self,
        image: &ImageInput,
    ) -> Result<BTreeMap<String, bool>, DetectError> {
        info!("detecting amenities in the image");
        let request = VisionRequest {
            image: image.clone(),
            prompt: detection_prompt(&self.schema.all_amenities()),
            follow_up: Some(DETECT_FOLLOW_UP.to_string()),
            sampling: Sampling::greedy(self.settings.detect_max_tokens),
        };
        let response = self.provider.generate(&request).await?;
        debug!(response = %response.text, "model response");

        let mut detected = match parser::parse_presence(&response.text) {
            Ok(map) => map,
            Err(e) => {
                error!(response = %response.text, "{}", e);
                BTreeMap::new()
            }
        };
        detected.retain(|name, _| {
            let known = self.schema.contains(name);
            if !known {
                debug!(amenity = %name, "dropping amenity outside the vocabulary");
            }
            known
        });
        Ok(detected)
    }

    pub async fn generate_description(
        &self,
        image: &ImageInput,
        present_by_room: &IndexMap<String, Vec<String>>,
    ) -> Result<String, DetectError> {
        info!("generating property description");
        if present_by_room.values().all(Vec::is_empty) {
            return Ok(NO_AMENITIES_DESCRIPTION.to_string());
        }
        let request = VisionRequest {
            image: image.clone(),
            prompt: description_prompt(present_by_room),
            follow_up: Some(DESCRIBE_FOLLOW_UP.to_string()),
            sampling: Sampling::sampled(self.settings.describe_max_tokens, 0.7, 0.9),
        };
        let response = self.provider.generate(&request).await?;
        Ok(parser::clean_description(&response.text))
    }
}

pub fn detection_prompt(vocabulary: &[String]) -> String {
    format!(
        "This is an image of a property. Please analyze the image and determine which \
         of the following amenities are present: {}. \
         Please provide the answer in JSON format, where the key is the amenity name \
         and the value is a boolean indicating the presence of the amenity in the image. \
         Only include the amenities that you are confident about and give a value of false \
         for the amenities that are not present in the image. \
         Example format: {{\"amenity1\": true, \"amenity2\": false, ...}}",
        vocabulary.join(", ")
    )
}

pub fn description_prompt(present_by_room: &IndexMap<String, Vec<String>>) -> String {
    let mut prompt = String::from(
        "Generate a natural and appealing property description highlighting these amenities:\n",
    );
    for (room, amenities) in present_by_room {
        if amenities.is_empty() {
            continue;
        }
        prompt.push_str(&format!(
            "- {}: {}\n",
            room.replace('_', " "),
            amenities.join(", ")
        ));
    }
    prompt
}
