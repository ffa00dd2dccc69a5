//! Ollama `/api/chat` with base64 images.

use crate::{check_status, trim_base, ProviderError, VisionProvider, VisionRequest, VisionResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    cfg: Arc<OllamaConfig>,
}

impl OllamaProvider {
    pub fn new(cfg: OllamaConfig) -> Self {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            cfg: Arc::new(cfg),
        }
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    options: Options,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

fn build_request<'a>(model: &'a str, request: &'a VisionRequest) -> ChatRequest<'a> {
    let mut messages = vec![Message {
        role: "user",
        content: &request.prompt,
        images: vec![request.image.to_base64()],
    }];
    if let Some(follow_up) = &request.follow_up {
        messages.push(Message {
            role: "user",
            content: follow_up,
            images: Vec::new(),
        });
    }
    ChatRequest {
        model,
        messages,
        stream: false,
        options: Options {
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            num_predict: request.sampling.max_tokens,
        },
    }
}

#[async_trait::async_trait]
impl VisionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &VisionRequest) -> Result<VisionResponse, ProviderError> {
        let body = build_request(&self.cfg.model, request);
        debug!(model = %self.cfg.model, max_tokens = request.sampling.max_tokens, "vision request");
        let resp = self
            .client
            .post(format!("{}/api/chat", trim_base(&self.cfg.host)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let resp = check_status(resp).await?;

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let text = parsed
            .message
            .map(|m| m.content)
            .ok_or(ProviderError::EmptyResponse)?;
        Ok(VisionResponse {
            text,
            model: parsed.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageInput, Sampling};

    #[test]
    fn image_rides_on_first_message_only() {
        let req = VisionRequest {
            image: ImageInput::new("image/jpeg", b"abc".to_vec()),
            prompt: "describe".into(),
            follow_up: Some("again".into()),
            sampling: Sampling::sampled(256, 0.7, 0.9),
        };
        let body = serde_json::to_value(build_request("llava:7b", &req)).unwrap();
        assert_eq!(body["model"], "llava:7b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["images"][0], "YWJj");
        assert!(body["messages"][1].get("images").is_none());
        assert_eq!(body["options"]["num_predict"], 256);
    }
}
