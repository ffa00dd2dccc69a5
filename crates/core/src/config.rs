use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub model: ModelConfig,
    pub amenity_schema: SchemaConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory of images or a single image file.
    pub path: String,
    pub recursive: bool,
    pub exclude: Vec<String>,
    /// Skip images whose stored content hash is unchanged.
    pub skip_unchanged: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: "data/images".to_string(),
            recursive: false,
            exclude: Vec::new(),
            skip_unchanged: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// openai | ollama | noop
    pub provider: String,
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Longest image side sent to the model, in pixels. 0 disables resizing.
    pub max_image_size: u32,
    pub detect_max_tokens: u32,
    pub describe_max_tokens: u32,
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            name: "llava-hf/llava-1.5-7b-hf".to_string(),
            base_url: "http://localhost:8000".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_image_size: 1024,
            detect_max_tokens: 512,
            describe_max_tokens: 256,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub from_file: bool,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
}

impl OutputConfig {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "outputs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Layers: explicit file (or optional `config/default`), then `AMENITY_<SECTION>__<KEY>` env vars.
/// `AMENITY_INPUT__EXCLUDE` takes a comma-separated list of globs.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("AMENITY")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("input.exclude"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
