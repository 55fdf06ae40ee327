//! The `Response{round}` record shared by R1, R2, and R3 (§3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Round {
    #[serde(rename = "INITIAL")]
    Initial,
    #[serde(rename = "META")]
    Meta,
    #[serde(rename = "ULTRAI")]
    Ultrai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub round: Round,
    pub model: String,
    pub text: String,
    pub ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl Response {
    pub fn success(round: Round, model: impl Into<String>, text: impl Into<String>, ms: u64) -> Self {
        Self { round, model: model.into(), text: text.into(), ms, error: None }
    }

    pub fn failure(round: Round, model: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self { round, model: model.into(), text: format!("ERROR: {}", diagnostic.into()), ms: 0, error: Some(true) }
    }

    pub fn is_error(&self) -> bool {
        self.error.unwrap_or(false)
    }
}
