//! Gateway client (C2): a single chat-completion call against the LLM
//! gateway, with the status-code policy, per-attempt timeouts, and
//! connection-pool sizing from §4.2.

pub mod backoff;
pub mod mock;
pub mod openrouter;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

pub use backoff::{BackoffConfig, JitterStrategy};
pub use mock::MockGateway;
pub use openrouter::OpenRouterGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Per-attempt timeout budget. R1 uses the full structured budget from
/// §4.2; R2 shortens the read timeout; R3 replaces all four with its own
/// dynamically computed stage-scoped deadline (§4.7).
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
    pub pool: Duration,
}

impl Timeouts {
    /// `connect=10s, read=15s, write=10s, pool=5s` — the R1 budget.
    pub fn primary() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(15),
            write: Duration::from_secs(10),
            pool: Duration::from_secs(5),
        }
    }

    /// Same as `primary()`; R2's shortened budget lives in `attempts`, not
    /// here — the read timeout is the same 15s per §4.6.
    pub fn meta() -> Self {
        Self::primary()
    }

    /// A single-deadline budget used for R3, where `read` carries the
    /// dynamically computed synthesis timeout and the others are generous.
    pub fn synthesis(read: Duration) -> Self {
        Self { connect: Duration::from_secs(10), read, write: Duration::from_secs(10), pool: Duration::from_secs(5) }
    }
}

/// A single chat-completion request to one model.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Result of a successful chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub elapsed_ms: u64,
}

/// Identity info used to build `Authorization`/`HTTP-Referer`/`X-Title`
/// headers on every outbound gateway call.
#[derive(Debug, Clone)]
pub struct Identity {
    pub api_key: String,
    pub site_url: String,
    pub site_name: String,
}

/// Abstraction over the LLM gateway's two endpoints: chat completion and
/// model listing. Exists so stages can be tested against [`MockGateway`]
/// without a live network dependency, the same way the teacher's `Backend`
/// trait decouples pipeline stages from a concrete provider.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// One chat-completion call, with retry handled internally per the
    /// status-code policy of §4.2, up to `attempts` tries.
    async fn chat(
        &self,
        request: &ChatRequest,
        identity: &Identity,
        timeouts: Timeouts,
        attempts: u32,
    ) -> GatewayResult<ChatReply>;

    /// Lists model ids the gateway currently reports as available.
    async fn list_models(&self, identity: &Identity) -> GatewayResult<Vec<String>>;
}
