//! Provider abstractions for hosted vision-language models.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod noop;
pub mod ollama;
pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("status {status} body {body}")]
    BadStatus { status: u16, body: String },
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Encoded image handed to a provider.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub mime: String,
    pub data: Vec<u8>,
}

impl ImageInput {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
}

impl Sampling {
    /// Deterministic decoding.
    pub fn greedy(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            temperature: 0.0,
            top_p: None,
        }
    }

    pub fn sampled(max_tokens: u32, temperature: f32, top_p: f32) -> Self {
        Self {
            max_tokens,
            temperature,
            top_p: Some(top_p),
        }
    }
}

/// One image plus a prompt, optionally followed by a second user turn.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub image: ImageInput,
    pub prompt: String,
    pub follow_up: Option<String>,
    pub sampling: Sampling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionResponse {
    pub text: String,
    pub model: Option<String>,
}

#[async_trait::async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &VisionRequest) -> Result<VisionResponse, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    vision: HashMap<String, Arc<dyn VisionProvider>>,
    pub preferred: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision(mut self, name: &str, provider: Arc<dyn VisionProvider>) -> Self {
        self.vision.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred(mut self, name: &str) -> Self {
        self.preferred = Some(name.to_string());
        self
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vision.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn vision(&self, name: Option<&str>) -> Result<Arc<dyn VisionProvider>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred.clone())
            .ok_or_else(|| ProviderError::UnknownProvider("no vision provider configured".into()))?;
        self.vision
            .get(&key)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(key))
    }
}

/// Shared by the HTTP providers: turn a non-2xx response into `BadStatus`.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp
        .bytes()
        .await
        .unwrap_or(bytes::Bytes::from_static(b""));
    Err(ProviderError::BadStatus {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

pub(crate) fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}
