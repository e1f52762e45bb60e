//! Raw transport to the chat-completions endpoint.
//!
//! Two request shapes pass through here: a single-image OCR prompt and a
//! text+schema prompt expecting a JSON object. The trait exists so tests
//! can script responses without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GatewayError;
use crate::config::GatewayConfig;

// ── Request / response types ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user message carrying a text part plus one image data-URL part.
    pub fn user_with_image(text: impl Into<String>, image_data_url: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url.into(),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            format_type: "json_object",
        }
    }
}

#[derive(Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: String,
}

// ── Client trait ─────────────────────────────────────────────────────────

/// Model endpoint abstraction (allows mocking)
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Issue one chat-completion call and return the message content.
    async fn chat(&self, request: &ChatRequest) -> Result<String, GatewayError>;
}

// ── HTTP implementation ──────────────────────────────────────────────────

/// HTTP client for a Mistral-style chat-completions API.
pub struct HttpModelClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    GatewayError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    GatewayError::Http("request timed out".to_string())
                } else {
                    GatewayError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 429, or providers that put "too many requests" in an error body
            if status.as_u16() == 429 || body.to_lowercase().contains("too many requests") {
                return Err(GatewayError::RateLimited(body));
            }
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ApiChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::MalformedResponse("response contained no choices".into()))
    }
}

// ── Mock for testing ─────────────────────────────────────────────────────

/// Mock model client: pops scripted responses, falls back to a default,
/// and records every request it sees.
pub struct MockModelClient {
    default_response: String,
    scripted: Mutex<VecDeque<Result<String, GatewayError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl MockModelClient {
    pub fn new(default_response: &str) -> Self {
        Self {
            default_response: default_response.to_string(),
            scripted: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a response consumed before the default kicks in.
    pub fn push_response(&self, response: Result<String, GatewayError>) {
        self.scripted
            .lock()
            .expect("mock lock poisoned")
            .push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("mock lock poisoned")
            .push(request.clone());

        let scripted = self
            .scripted
            .lock()
            .expect("mock lock poisoned")
            .pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(self.default_response.clone()),
        }
    }
}
