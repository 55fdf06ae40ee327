//! Process-wide configuration (C11), assembled once from the environment at
//! startup so stage executors borrow typed values instead of reading
//! `std::env` directly — the latter is what would make them hard to test
//! against a mock gateway.

use std::path::PathBuf;

use crate::error::OrchestratorError;
use crate::gateway::Identity;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub site_url: String,
    pub site_name: String,
    pub runs_base: PathBuf,
    pub log_json: bool,
    pub prod_log_max_bytes: u64,
    /// The single origin CORS is opened for (§6: "CORS allows exactly the
    /// configured frontend origin"). Not itself named in §6's env var list,
    /// so this crate reads it from `FRONTEND_ORIGIN` (see DESIGN.md).
    pub frontend_origin: String,
}

impl Config {
    /// Reads `OPENROUTER_API_KEY` (required), `YOUR_SITE_URL`/`YOUR_SITE_NAME`
    /// (optional, defaulted), `LOG_JSON`, `PROD_LOG_MAX_BYTES`, and
    /// `FRONTEND_ORIGIN` (§6).
    pub fn from_env() -> Result<Self, OrchestratorError> {
        let api_key = std::env::var("OPENROUTER_API_KEY").map_err(|_| OrchestratorError::MissingCredential)?;
        if api_key.trim().is_empty() {
            return Err(OrchestratorError::MissingCredential);
        }
        let site_url = std::env::var("YOUR_SITE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        let site_name = std::env::var("YOUR_SITE_NAME").unwrap_or_else(|_| "UltrAI Project".to_string());
        let log_json = std::env::var("LOG_JSON").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let prod_log_max_bytes = std::env::var("PROD_LOG_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10 * 1024 * 1024);
        let frontend_origin =
            std::env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            api_key,
            site_url,
            site_name,
            runs_base: PathBuf::from("runs"),
            log_json,
            prod_log_max_bytes,
            frontend_origin,
        })
    }

    pub fn identity(&self) -> Identity {
        Identity { api_key: self.api_key.clone(), site_url: self.site_url.clone(), site_name: self.site_name.clone() }
    }
}
