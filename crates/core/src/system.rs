use crate::config::{AppConfig, ModelConfig};
use crate::data_manager::{AmenityDataManager, ResultRow};
use crate::detector::{AmenityDetector, DetectorSettings};
use crate::imaging;
use crate::models::{Detection, DetectionRecord};
use crate::scanner::{self, ScanOptions};
use crate::schema::{load_schema, AmenitySchema};
use anyhow::Context;
use providers::noop::NoopProvider;
use providers::ollama::{OllamaConfig, OllamaProvider};
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::{ProviderRegistry, VisionProvider};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::models::{AmenityFrequency, ImageSummary};
use tokio::task;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub discovered: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub summary: Vec<ImageSummary>,
}

/// Detect → store flow shared by the CLI and the HTTP API.
pub struct PropertyAmenitySystem {
    config: AppConfig,
    schema: Arc<AmenitySchema>,
    detector: AmenityDetector,
    data: AmenityDataManager,
}

impl PropertyAmenitySystem {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let registry = build_registry(&config.model);
        let provider = registry
            .vision(None)
            .with_context(|| format!("available providers: {}", registry.names().join(", ")))?;
        Self::with_provider(config, provider).await
    }

    pub async fn with_provider(config: AppConfig, provider: Arc<dyn VisionProvider>) -> anyhow::Result<Self> {
        let schema = Arc::new(load_schema(&config.amenity_schema));
        let detector = AmenityDetector::new(
            provider,
            schema.clone(),
            DetectorSettings::from(&config.model),
        );
        let data = AmenityDataManager::open(config.output.dir(), schema.clone()).await?;
        info!("property amenity system initialized");
        Ok(Self {
            config,
            schema,
            detector,
            data,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn schema(&self) -> &AmenitySchema {
        &self.schema
    }

    pub fn data(&self) -> &AmenityDataManager {
        &self.data
    }

    pub async fn process_image(&self, path: &Path) -> anyhow::Result<(Detection, DetectionRecord)> {
        let bytes = read_image(path).await?;
        let hash = imaging::content_hash(&bytes);
        self.detect_and_store(path, bytes, hash).await
    }

    /// `None` when `skip_unchanged` is set and the stored hash matches.
    async fn process_entry(
        &self,
        path: &Path,
        skip_unchanged: bool,
    ) -> anyhow::Result<Option<(Detection, DetectionRecord)>> {
        let bytes = read_image(path).await?;
        let hash = imaging::content_hash(&bytes);
        if skip_unchanged {
            let stored = self.data.stored_hash(&path.to_string_lossy()).await?;
            if stored.as_deref() == Some(hash.as_str()) {
                debug!(image = %path.display(), "content unchanged, skipping");
                return Ok(None);
            }
        }
        self.detect_and_store(path, bytes, hash).await.map(Some)
    }

    async fn detect_and_store(
        &self,
        path: &Path,
        bytes: Vec<u8>,
        hash: String,
    ) -> anyhow::Result<(Detection, DetectionRecord)> {
        info!(image = %path.display(), "processing image");
        let detection = self
            .detector
            .detect_bytes(bytes)
            .await
            .with_context(|| format!("detection failed for {}", path.display()))?;
        let record = DetectionRecord::new(path, &detection, Some(hash));
        self.data.save(&record, &detection.amenities_by_room).await?;
        Ok((detection, record))
    }

    /// Processes every image under `dir` one at a time; failures are logged and counted.
    pub async fn process_directory(&self, dir: &Path) -> anyhow::Result<RunReport> {
        info!(dir = %dir.display(), "processing all images in directory");
        let opts = ScanOptions {
            recursive: self.config.input.recursive,
            exclude: self.config.input.exclude.clone(),
        };
        let root = dir.to_path_buf();
        let images = task::spawn_blocking(move || scanner::scan_images(&root, &opts)).await??;

        let mut report = RunReport {
            discovered: images.len(),
            ..RunReport::default()
        };
        if images.is_empty() {
            warn!(dir = %dir.display(), "no images found");
            return Ok(report);
        }
        info!("found {} images to process", images.len());

        for path in &images {
            match self.process_entry(path, self.config.input.skip_unchanged).await {
                Ok(Some((detection, _))) => {
                    report.processed += 1;
                    info!(image = %path.display(), description = %detection.description, "processed");
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(image = %path.display(), "error processing image: {:#}", e);
                }
            }
        }
        report.summary = self.data.results_summary().await;
        Ok(report)
    }

    /// Processes an uploaded image via a temporary file under `<output>/temp`.
    pub async fn process_image_bytes(&self, bytes: &[u8], name: &str) -> anyhow::Result<(Detection, DetectionRecord)> {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "upload.jpg".to_string());
        info!(image = %file_name, "processing in-memory image");

        let temp_dir = self.data.output_dir().join("temp");
        tokio::fs::create_dir_all(&temp_dir).await?;
        let temp = TempFile(temp_dir.join(file_name));
        tokio::fs::write(&temp.0, bytes)
            .await
            .with_context(|| format!("failed to write {}", temp.0.display()))?;
        self.process_image(&temp.0).await
    }

    pub async fn all_results(&self) -> Vec<ResultRow> {
        self.data.all_results().await
    }

    pub async fn results_summary(&self) -> Vec<ImageSummary> {
        self.data.results_summary().await
    }

    pub async fn amenity_frequencies(&self) -> anyhow::Result<Vec<AmenityFrequency>> {
        self.data.amenity_frequencies().await
    }
}

async fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Removed on drop, including when processing fails.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.0.display(), "failed to remove temporary file: {}", e);
            }
        }
    }
}

pub fn build_registry(model: &ModelConfig) -> ProviderRegistry {
    let api_key = model
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let openai = OpenAiProvider::new(OpenAiConfig {
        api_key,
        base_url: model.base_url.clone(),
        chat_model: model.name.clone(),
        timeout: model.timeout(),
    });
    let ollama = OllamaProvider::new(OllamaConfig {
        host: model.base_url.clone(),
        model: model.name.clone(),
        timeout: model.timeout(),
    });
    ProviderRegistry::new()
        .with_vision("noop", Arc::new(NoopProvider))
        .with_vision("openai", Arc::new(openai))
        .with_vision("ollama", Arc::new(ollama))
        .set_preferred(&model.provider)
}
