//! Mock gateway for testing stage executors without a live OpenRouter
//! dependency.
//!
//! [`MockGateway`] returns pre-scripted results keyed by model id, allowing
//! deterministic tests of activation, R1/R2 fan-out, and R3 synthesis.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatReply, ChatRequest, Gateway, Identity, Timeouts};
use crate::error::{GatewayError, GatewayResult};

/// A scripted outcome for one model id.
#[derive(Debug, Clone)]
pub enum Scripted {
    Success { text: String, elapsed_ms: u64 },
    Fail(MockFailure),
}

#[derive(Debug, Clone)]
pub enum MockFailure {
    InvalidCredential,
    InsufficientCredit,
    RateLimited,
    ServerError,
    MidStreamError,
    Timeout,
}

impl Scripted {
    pub fn ok(text: impl Into<String>) -> Self {
        Scripted::Success { text: text.into(), elapsed_ms: 1 }
    }

    pub fn ok_with_ms(text: impl Into<String>, elapsed_ms: u64) -> Self {
        Scripted::Success { text: text.into(), elapsed_ms }
    }

    pub fn fail(failure: MockFailure) -> Self {
        Scripted::Fail(failure)
    }
}

/// A gateway double keyed by model id. `ready_list` is returned verbatim by
/// `list_models`; `chat` looks up `responses[model]`, defaulting to a
/// `ServerError` mock failure for any model not explicitly scripted so a
/// forgotten entry fails loudly in a test rather than hanging.
pub struct MockGateway {
    pub ready_list: Vec<String>,
    responses: HashMap<String, Scripted>,
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new(ready_list: Vec<String>) -> Self {
        Self { ready_list, responses: HashMap::new(), calls: Mutex::new(Vec::new()) }
    }

    pub fn with_response(mut self, model: impl Into<String>, outcome: Scripted) -> Self {
        self.responses.insert(model.into(), outcome);
        self
    }

    /// Model ids that were actually requested, in call order (duplicates
    /// included) — useful for asserting fan-out behavior in tests.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn chat(
        &self,
        request: &ChatRequest,
        _identity: &Identity,
        _timeouts: Timeouts,
        _attempts: u32,
    ) -> GatewayResult<ChatReply> {
        self.calls.lock().unwrap().push(request.model.clone());
        match self.responses.get(&request.model) {
            Some(Scripted::Success { text, elapsed_ms }) => {
                Ok(ChatReply { text: text.clone(), elapsed_ms: *elapsed_ms })
            }
            Some(Scripted::Fail(MockFailure::InvalidCredential)) => Err(GatewayError::InvalidCredential),
            Some(Scripted::Fail(MockFailure::InsufficientCredit)) => Err(GatewayError::InsufficientCredit),
            Some(Scripted::Fail(MockFailure::RateLimited)) => {
                Err(GatewayError::RateLimited { retry_after: std::time::Duration::from_secs(1) })
            }
            Some(Scripted::Fail(MockFailure::ServerError)) => Err(GatewayError::ServerError { status: 503 }),
            Some(Scripted::Fail(MockFailure::MidStreamError)) => {
                Err(GatewayError::MidStreamError { message: "mock mid-stream error".to_string() })
            }
            Some(Scripted::Fail(MockFailure::Timeout)) => Err(GatewayError::Timeout),
            None => Err(GatewayError::ServerError { status: 503 }),
        }
    }

    async fn list_models(&self, _identity: &Identity) -> GatewayResult<Vec<String>> {
        Ok(self.ready_list.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatMessage, Identity};

    fn identity() -> Identity {
        Identity { api_key: "k".into(), site_url: "http://localhost".into(), site_name: "test".into() }
    }

    #[tokio::test]
    async fn scripted_success_returned_verbatim() {
        let gw = MockGateway::new(vec!["a".into()]).with_response("a", Scripted::ok("hi"));
        let req = ChatRequest { model: "a".into(), messages: vec![ChatMessage::user("q")] };
        let reply = gw.chat(&req, &identity(), Timeouts::primary(), 1).await.unwrap();
        assert_eq!(reply.text, "hi");
    }

    #[tokio::test]
    async fn unscripted_model_fails_loudly() {
        let gw = MockGateway::new(vec![]);
        let req = ChatRequest { model: "unscripted".into(), messages: vec![] };
        assert!(gw.chat(&req, &identity(), Timeouts::primary(), 1).await.is_err());
    }

    #[tokio::test]
    async fn records_call_order() {
        let gw = MockGateway::new(vec![]).with_response("a", Scripted::ok("x")).with_response("b", Scripted::ok("y"));
        let identity = identity();
        gw.chat(&ChatRequest { model: "a".into(), messages: vec![] }, &identity, Timeouts::primary(), 1)
            .await
            .unwrap();
        gw.chat(&ChatRequest { model: "b".into(), messages: vec![] }, &identity, Timeouts::primary(), 1)
            .await
            .unwrap();
        assert_eq!(gw.calls(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn ok_with_ms_carries_elapsed_time() {
        let gw = MockGateway::new(vec![]).with_response("a", Scripted::ok_with_ms("x", 42));
        let reply =
            gw.chat(&ChatRequest { model: "a".into(), messages: vec![] }, &identity(), Timeouts::primary(), 1)
                .await
                .unwrap();
        assert_eq!(reply.elapsed_ms, 42);
    }
}
