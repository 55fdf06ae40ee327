//! Readiness probe (C3): lists available model ids and writes
//! `00_ready.json`.

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactStore, RunDir};
use crate::config::Config;
use crate::error::{ArtifactError, OrchestratorError};
use crate::gateway::Gateway;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyArtifact {
    pub run_id: String,
    #[serde(rename = "readyList")]
    pub ready_list: Vec<String>,
    pub status: String,
    pub llm_count: usize,
    pub timestamp: String,
}

/// Calls the gateway's model-list endpoint once and writes `00_ready.json`.
/// Fails with `LowPluralism` if fewer than 2 models come back. A missing
/// credential is checked earlier, by [`Config::from_env`], so it never
/// reaches here (§7: refused synchronously by the controller).
pub async fn check_readiness(
    store: &ArtifactStore,
    run_dir: &RunDir,
    config: &Config,
    gateway: &dyn Gateway,
) -> Result<ReadyArtifact, OrchestratorError> {
    let ready_list = gateway.list_models(&config.identity()).await?;
    if ready_list.len() < 2 {
        return Err(OrchestratorError::LowPluralism(ready_list.len()));
    }

    let artifact = ReadyArtifact {
        run_id: run_dir.run_id().to_string(),
        llm_count: ready_list.len(),
        ready_list,
        status: "READY".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    store
        .write(run_dir, "00_ready", &artifact)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;

    Ok(artifact)
}
