//! OpenAI-compatible chat completions (vLLM, LM Studio, hosted OpenAI).

use crate::{check_status, trim_base, ProviderError, VisionProvider, VisionRequest, VisionResponse};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    cfg: Arc<OpenAiConfig>,
}

impl OpenAiProvider {
    pub fn new(cfg: OpenAiConfig) -> Self {
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
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

fn build_request<'a>(model: &'a str, request: &'a VisionRequest) -> ChatRequest<'a> {
    let mut messages = vec![ChatMessage {
        role: "user",
        content: vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: request.image.data_url(),
                },
            },
            ContentPart::Text {
                text: &request.prompt,
            },
        ],
    }];
    if let Some(follow_up) = &request.follow_up {
        messages.push(ChatMessage {
            role: "user",
            content: vec![ContentPart::Text { text: follow_up }],
        });
    }
    ChatRequest {
        model,
        messages,
        max_tokens: request.sampling.max_tokens,
        temperature: request.sampling.temperature,
        top_p: request.sampling.top_p,
    }
}

#[async_trait::async_trait]
impl VisionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &VisionRequest) -> Result<VisionResponse, ProviderError> {
        let body = build_request(&self.cfg.chat_model, request);
        debug!(model = %self.cfg.chat_model, max_tokens = request.sampling.max_tokens, "vision request");

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", trim_base(&self.cfg.base_url)))
            .json(&body);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let resp = check_status(resp).await?;

        let parsed: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
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

    fn request(follow_up: Option<&str>) -> VisionRequest {
        VisionRequest {
            image: ImageInput::new("image/jpeg", b"abc".to_vec()),
            prompt: "which amenities?".into(),
            follow_up: follow_up.map(str::to_string),
            sampling: Sampling::greedy(512),
        }
    }

    #[test]
    fn request_puts_image_before_prompt() {
        let req = request(Some("Please follow the prompt"));
        let body = serde_json::to_value(build_request("llava", &req)).unwrap();
        assert_eq!(body["model"], "llava");
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("top_p").is_none());
        let first = &body["messages"][0]["content"];
        assert_eq!(first[0]["type"], "image_url");
        assert_eq!(first[0]["image_url"]["url"], "data:image/jpeg;base64,YWJj");
        assert_eq!(first[1]["type"], "text");
        assert_eq!(first[1]["text"], "which amenities?");
        assert_eq!(body["messages"][1]["content"][0]["text"], "Please follow the prompt");
    }

    #[test]
    fn request_without_follow_up_has_single_turn() {
        let mut req = request(None);
        req.sampling = Sampling::sampled(256, 0.7, 0.9);
        let body = serde_json::to_value(build_request("llava", &req)).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!((body["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn response_with_null_content_is_empty() {
        let parsed: ChatApiResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.model.is_none());
    }
}
