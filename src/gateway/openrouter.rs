//! OpenRouter-compatible implementation of [`Gateway`]: one chat-completion
//! POST and one model-listing GET, with the status-code policy of §4.2.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::backoff::BackoffConfig;
use super::{ChatReply, ChatRequest, Gateway, Identity, Timeouts};
use crate::error::{GatewayError, GatewayResult};

const CHAT_PATH: &str = "https://openrouter.ai/api/v1/chat/completions";
const MODELS_PATH: &str = "https://openrouter.ai/api/v1/models";

pub struct OpenRouterGateway {
    client: Client,
}

impl OpenRouterGateway {
    /// Builds a client with pooling sized to the primary fan-out width
    /// (`max_connections = max_keepalive = 3`, keepalive 30s — §4.2).
    pub fn new() -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(3)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }
}

impl Default for OpenRouterGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for OpenRouterGateway {
    async fn chat(
        &self,
        request: &ChatRequest,
        identity: &Identity,
        timeouts: Timeouts,
        attempts: u32,
    ) -> GatewayResult<ChatReply> {
        let backoff = BackoffConfig::server_error();
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
        });

        let mut last_err: Option<GatewayError> = None;
        for attempt in 0..attempts {
            let start = Instant::now();
            let result = self
                .client
                .post(CHAT_PATH)
                .timeout(timeouts.read)
                .header("Authorization", format!("Bearer {}", identity.api_key))
                .header("HTTP-Referer", &identity.site_url)
                .header("X-Title", &identity.site_name)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    last_err = Some(GatewayError::Timeout);
                    continue;
                }
                Err(e) => return Err(GatewayError::Transport(e)),
            };

            let status = response.status();
            match status {
                StatusCode::UNAUTHORIZED => return Err(GatewayError::InvalidCredential),
                StatusCode::PAYMENT_REQUIRED => return Err(GatewayError::InsufficientCredit),
                StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = parse_retry_after(&response).unwrap_or(10);
                    let capped = retry_after.min(10);
                    last_err = Some(GatewayError::RateLimited { retry_after: Duration::from_secs(capped) });
                    if attempt + 1 < attempts {
                        tokio::time::sleep(Duration::from_secs(capped)).await;
                    }
                    continue;
                }
                s if s.as_u16() >= 500 => {
                    last_err = Some(GatewayError::ServerError { status: s.as_u16() });
                    if attempt + 1 < attempts {
                        tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                    }
                    continue;
                }
                s if !s.is_success() => {
                    let text = response.text().await.unwrap_or_default();
                    return Err(GatewayError::MalformedResponse(format!("HTTP {status}: {text}")));
                }
                _ => {}
            }

            let value: Value = response
                .json()
                .await
                .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
            let choice = value
                .get("choices")
                .and_then(|c| c.get(0))
                .ok_or_else(|| GatewayError::MalformedResponse("missing choices[0]".to_string()))?;

            if choice.get("finish_reason").and_then(|v| v.as_str()) == Some("error") {
                let message = choice
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown mid-stream error")
                    .to_string();
                return Err(GatewayError::MidStreamError { message });
            }

            let text = choice
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| GatewayError::MalformedResponse("missing choices[0].message.content".to_string()))?
                .to_string();

            return Ok(ChatReply { text, elapsed_ms: start.elapsed().as_millis() as u64 });
        }

        Err(last_err.unwrap_or(GatewayError::Timeout))
    }

    async fn list_models(&self, identity: &Identity) -> GatewayResult<Vec<String>> {
        let response = self
            .client
            .get(MODELS_PATH)
            .timeout(Duration::from_secs(60))
            .header("Authorization", format!("Bearer {}", identity.api_key))
            .header("HTTP-Referer", &identity.site_url)
            .header("X-Title", &identity.site_name)
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(GatewayError::InvalidCredential),
            StatusCode::PAYMENT_REQUIRED => return Err(GatewayError::InsufficientCredit),
            s if !s.is_success() => {
                return Err(GatewayError::ServerError { status: s.as_u16() });
            }
            _ => {}
        }

        let value: Value = response.json().await.map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        let ids = value
            .get("data")
            .and_then(|d| d.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("id").and_then(|v| v.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response.headers().get("Retry-After")?.to_str().ok()?.trim().parse().ok()
}
