//! Error types for every layer of the orchestrator: gateway transport,
//! artifact I/O, stage preconditions, and the HTTP boundary.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as AxumResponse};
use serde_json::json;
use thiserror::Error;

/// Errors produced by a single chat-completion call to the LLM gateway.
///
/// Transient variants (`RateLimited`, `ServerError`, `Timeout`) are retried
/// internally by the gateway client per its backoff budget; if the budget is
/// exhausted they surface here and the caller absorbs them into an
/// `error:true` response record rather than failing the stage.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid credential")]
    InvalidCredential,

    #[error("insufficient credit")]
    InsufficientCredit,

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("gateway server error: status {status}")]
    ServerError { status: u16 },

    #[error("mid-stream error: {message}")]
    MidStreamError { message: String },

    #[error("request timed out")]
    Timeout,

    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    /// True for the per-call fatal variants that must abort the run rather
    /// than be absorbed as a per-model failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::InvalidCredential | GatewayError::InsufficientCredit)
    }
}

/// Errors from the artifact store (C1): path sandboxing and JSON I/O.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("run id '{0}' contains forbidden characters")]
    InvalidRunId(String),

    #[error("resolved path for '{0}' escapes the runs base directory")]
    PathEscape(String),

    #[error("artifact '{name}' not found in {run_id}")]
    NotFound { run_id: String, name: String },

    #[error("artifact name '{0}' is not a permitted *.json name")]
    InvalidArtifactName(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that abort an entire run (precondition and configuration failures
/// from §7). Each becomes exactly one `error.txt` write by the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("missing OPENROUTER_API_KEY")]
    MissingCredential,

    #[error("low pluralism: only {0} model(s) ready, need at least 2")]
    LowPluralism(usize),

    #[error("cocktail unsatisfiable: only {filled}/{needed} slots could be filled")]
    CocktailUnsatisfiable { filled: usize, needed: usize },

    #[error("insufficient active models: {0} < quorum")]
    InsufficientActive(usize),

    #[error("insufficient peers for META round: {0} < 2")]
    InsufficientPeers(usize),

    #[error("required artifact missing: {0}")]
    ArtifactMissing(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    /// Short variant label for the `type` field of `error.txt` (§4.9's
    /// `type: message\n\n<stack>` shape) — not the Display message, which
    /// already carries the details.
    pub fn type_name(&self) -> &'static str {
        match self {
            OrchestratorError::MissingCredential => "MissingCredential",
            OrchestratorError::LowPluralism(_) => "LowPluralism",
            OrchestratorError::CocktailUnsatisfiable { .. } => "CocktailUnsatisfiable",
            OrchestratorError::InsufficientActive(_) => "InsufficientActive",
            OrchestratorError::InsufficientPeers(_) => "InsufficientPeers",
            OrchestratorError::ArtifactMissing(_) => "ArtifactMissing",
            OrchestratorError::Gateway(_) => "Gateway",
            OrchestratorError::Artifact(_) => "Artifact",
            OrchestratorError::Other(_) => "Other",
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// Errors at the axum boundary (C9): the HTTP-visible subset of §7's
/// error taxonomy, each mapped to the status code the integrity/
/// precondition rules in §7 call for.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("run not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> AxumResponse {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Artifact(ArtifactError::NotFound { .. }) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Artifact(
                ArtifactError::InvalidRunId(_)
                | ArtifactError::PathEscape(_)
                | ArtifactError::InvalidArtifactName(_),
            ) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Artifact(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Orchestrator(OrchestratorError::MissingCredential) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Orchestrator(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, axum::Json(json!({"error": message}))).into_response()
    }
}
