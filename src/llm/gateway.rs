//! The rate-limited, retrying boundary to the remote extraction model.

use std::sync::Arc;

use tracing::{debug, warn};

use super::client::{ChatMessage, ChatRequest, ModelClient, ResponseFormat};
use super::limiter::RateLimiter;
use super::retry::backoff_delay;
use super::GatewayError;
use crate::config::GatewayConfig;

pub struct ModelGateway {
    client: Arc<dyn ModelClient>,
    limiter: Arc<RateLimiter>,
    config: GatewayConfig,
}

impl ModelGateway {
    pub fn new(
        client: Arc<dyn ModelClient>,
        limiter: Arc<RateLimiter>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            client,
            limiter,
            config,
        }
    }

    /// The concurrency cap. Page pipelines size their worker pools to it.
    pub fn concurrency(&self) -> usize {
        self.config.max_concurrent_calls
    }

    /// OCR one page image (base64 PNG) into plain text.
    pub async fn extract_page_text(
        &self,
        base64_png: &str,
        page_number: u32,
    ) -> Result<String, GatewayError> {
        let prompt = self
            .config
            .ocr_prompt
            .replace("{page}", &page_number.to_string());
        let data_url = format!("data:image/png;base64,{base64_png}");

        let request = ChatRequest {
            model: self.config.ocr_model.clone(),
            messages: vec![ChatMessage::user_with_image(prompt, data_url)],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            response_format: None,
        };
        self.invoke(request).await
    }

    /// One text+schema call expected to yield a JSON object. Returns the raw
    /// message content; callers parse and validate the shape.
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: self.config.extraction_model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user_text(user)],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            response_format: Some(ResponseFormat::json_object()),
        };
        self.invoke(request).await
    }

    async fn invoke(&self, request: ChatRequest) -> Result<String, GatewayError> {
        let permit = self.limiter.acquire().await;

        // Backoff sleeps and the cooldown both run while the permit is held:
        // the slot throttles the provider's effective request rate, not just
        // how many calls are in flight.
        let result = self.call_with_retry(&request).await;
        self.limiter.cooldown().await;
        drop(permit);

        result
    }

    async fn call_with_retry(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            match self.client.chat(request).await {
                Ok(content) => {
                    if attempt > 0 {
                        debug!(model = %request.model, attempt, "Model call succeeded after retry");
                    }
                    return Ok(content);
                }
                Err(e) if e.is_rate_limit() => {
                    if attempt >= retry.max_retries {
                        return Err(GatewayError::RetriesExhausted {
                            attempts: attempt + 1,
                        });
                    }
                    let wait = backoff_delay(retry, attempt);
                    warn!(
                        model = %request.model,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "Model rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
