//! R3 synthesizer (C7): a single neutral model merges the META drafts into
//! one synthesis, under a dynamically sized timeout and truncation budget
//! (§4.7).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactStore, RunDir};
use crate::cocktail::{max_chars_per_draft, synthesis_timeout_secs, NEUTRAL_PREFERENCE};
use crate::error::{ArtifactError, OrchestratorError};
use crate::gateway::{ChatMessage, ChatRequest, Gateway, Identity, Timeouts};
use crate::response::Response;

/// Pacing buffer between R3 progress milestones. The original source used
/// 3s here, a debugging artifact; this crate uses the 500ms figure the
/// rest of the pipeline's progress milestones use (see DESIGN.md).
const MILESTONE_PACING: Duration = Duration::from_millis(500);

/// R3 is "one call" (§4.7) but that call still goes through §4.2's generic
/// per-call retry policy (429/5xx), which only engages when `attempts >= 2`;
/// the original `ultrai_synthesis.py` uses `max_retries = 3`.
const SYNTHESIS_ATTEMPTS: u32 = 3;

pub type SynthesisProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisStats {
    pub active_count: usize,
    pub meta_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisArtifact {
    pub round: String,
    pub model: String,
    #[serde(rename = "neutralChosen")]
    pub neutral_chosen: String,
    pub text: String,
    pub ms: u64,
    pub stats: SynthesisStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisDetails {
    pub model: String,
    pub neutral: bool,
    pub concurrency_from_meta: Option<usize>,
    pub timeout: f64,
    pub context_length: usize,
    pub num_meta_drafts: usize,
    pub max_chars_per_draft: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisStatus {
    pub status: String,
    pub round: String,
    pub details: SynthesisDetails,
}

/// Walks [`NEUTRAL_PREFERENCE`] for the first id present in `active_list`;
/// falls back to `active_list[0]` if none match (§4.7).
pub fn select_neutral_model(active_list: &[String]) -> Option<String> {
    NEUTRAL_PREFERENCE
        .iter()
        .find(|id| active_list.iter().any(|m| m == *id))
        .map(|id| id.to_string())
        .or_else(|| active_list.first().cloned())
}

fn build_peer_context(meta: &[Response], max_chars: usize) -> String {
    meta.iter()
        .map(|r| {
            if r.is_error() {
                format!("- {}: ERROR", r.model)
            } else {
                let snippet: String = r.text.chars().take(max_chars).collect();
                format!("- {}: {}", r.model, snippet)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_instruction(query: &str, peer_context: &str) -> String {
    format!(
        "The user asked: \"{query}\"\n\n\
Multiple LLM models provided META responses to this query. Your job is to synthesize these META drafts into one coherent answer that best addresses the user's original query.\n\n\
CRITICAL CONSTRAINTS:\n\
- DO NOT introduce new information beyond what the META models provided\n\
- DO NOT use your own knowledge - rely ONLY on the META drafts and the query\n\
- DO NOT include data that evokes low confidence (omit claims where models strongly disagree or express uncertainty)\n\
- Your role is to MERGE and SYNTHESIZE, not to contribute new content\n\n\
Review all META drafts below. Merge convergent points and resolve contradictions. Cite which META claims were retained or omitted. \
Generate one coherent synthesis with confidence notes and basic stats.\n\nMETA DRAFTS:\n{peer_context}"
    )
}

async fn pace(on_progress: &Option<SynthesisProgressCallback>, text: &str, percent: u8) {
    if let Some(cb) = on_progress {
        cb(text, percent);
    }
    tokio::time::sleep(MILESTONE_PACING).await;
}

/// Runs R3. `query` is `01_inputs.json.QUERY`; `active_list` is
/// `02_activate.json.activeList`; `concurrency_from_meta` is carried
/// through from `04_meta_status.json` purely for reporting.
pub async fn run_synthesis(
    store: &ArtifactStore,
    run_dir: &RunDir,
    active_list: &[String],
    meta: &[Response],
    query: &str,
    concurrency_from_meta: Option<usize>,
    identity: &Identity,
    gateway: Arc<dyn Gateway>,
    on_progress: Option<SynthesisProgressCallback>,
) -> Result<(SynthesisArtifact, SynthesisStatus), OrchestratorError> {
    pace(&on_progress, "Initializing NEUTRAL LLM", 0).await;

    if active_list.len() < 2 {
        return Err(OrchestratorError::InsufficientActive(active_list.len()));
    }

    pace(&on_progress, "receives META Output", 20).await;

    let neutral_model = select_neutral_model(active_list)
        .ok_or_else(|| OrchestratorError::Other("unable to select neutral model from active list".to_string()))?;

    // L is measured on the full, untruncated concatenation (§4.7) — the
    // timeout bucket and the truncation cap both derive from it, before any
    // draft is actually cut down.
    let full_context = build_peer_context(meta, usize::MAX);
    let timeout_secs = synthesis_timeout_secs(full_context.len(), meta.len());
    let max_chars = max_chars_per_draft(timeout_secs);
    let peer_context = build_peer_context(meta, max_chars);

    pace(&on_progress, "Reviews", 40).await;

    let instruction = build_instruction(query, &peer_context);

    pace(&on_progress, "Writing Synthesis", 60).await;

    let request = ChatRequest {
        model: neutral_model.clone(),
        messages: vec![
            ChatMessage::system("You are the ULTRAI neutral synthesis model (R3)."),
            ChatMessage::user(instruction),
        ],
    };
    let timeouts = Timeouts::synthesis(Duration::from_secs_f64(timeout_secs));
    // One logical call, but §4.2's generic retry policy (429/5xx) still
    // applies here per §4.7 — `attempts` must be >=2 for it to fire.
    let reply = gateway.chat(&request, identity, timeouts, SYNTHESIS_ATTEMPTS).await?;

    pace(&on_progress, "Synthesis ready", 80).await;

    let artifact = SynthesisArtifact {
        round: "ULTRAI".to_string(),
        model: neutral_model.clone(),
        neutral_chosen: neutral_model.clone(),
        text: reply.text,
        ms: reply.elapsed_ms,
        stats: SynthesisStats { active_count: active_list.len(), meta_count: meta.len() },
    };
    let status = SynthesisStatus {
        status: "COMPLETED".to_string(),
        round: "R3".to_string(),
        details: SynthesisDetails {
            model: neutral_model,
            neutral: true,
            concurrency_from_meta,
            timeout: timeout_secs,
            context_length: full_context.len(),
            num_meta_drafts: meta.len(),
            max_chars_per_draft: max_chars,
        },
    };

    store
        .write(run_dir, "05_ultrai", &artifact)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;
    store
        .write(run_dir, "05_ultrai_status", &status)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;

    Ok((artifact, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::Scripted;
    use crate::gateway::MockGateway;
    use crate::response::Round;

    fn identity() -> Identity {
        Identity { api_key: "k".into(), site_url: "http://localhost".into(), site_name: "test".into() }
    }

    #[test]
    fn neutral_preference_picks_first_present_member() {
        let active = vec!["anthropic/claude-3.7-sonnet".to_string(), "openai/gpt-4o-mini".to_string()];
        assert_eq!(select_neutral_model(&active).unwrap(), "openai/gpt-4o-mini");
    }

    #[test]
    fn neutral_preference_falls_back_to_first_active_when_none_match() {
        let active = vec!["some/unlisted-model".to_string(), "another/model".to_string()];
        assert_eq!(select_neutral_model(&active).unwrap(), "some/unlisted-model");
    }

    #[tokio::test]
    async fn synthesizes_with_selected_neutral_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let run_dir = store.resolve("r1").unwrap();
        let active = vec!["openai/gpt-4o-mini".to_string(), "anthropic/claude-3.7-sonnet".to_string()];
        let meta =
            vec![Response::success(Round::Meta, "openai/gpt-4o-mini", "revised a", 5), Response::success(Round::Meta, "anthropic/claude-3.7-sonnet", "revised b", 5)];
        let gw = MockGateway::new(vec![]).with_response("openai/gpt-4o-mini", Scripted::ok("final synthesis"));
        let (artifact, status) = run_synthesis(
            &store,
            &run_dir,
            &active,
            &meta,
            "2+2?",
            Some(2),
            &identity(),
            Arc::new(gw),
            None,
        )
        .await
        .unwrap();
        assert_eq!(artifact.model, "openai/gpt-4o-mini");
        assert_eq!(artifact.text, "final synthesis");
        assert_eq!(status.details.num_meta_drafts, 2);
        assert!(store.exists(&run_dir, "05_ultrai"));
    }

    #[tokio::test]
    async fn synthesis_timeout_selection_from_full_context_length() {
        // S6: concatenated META context of 4500 chars across 4 drafts must
        // select timeout 120*1.2=144 and max_chars_per_draft=1200.
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let run_dir = store.resolve("r1").unwrap();
        let active = vec!["openai/gpt-4o-mini".to_string(), "anthropic/claude-3.7-sonnet".to_string()];
        let label_overhead = "- m0: ".len();
        let draft_len = 4500 / 4 - label_overhead;
        let models = ["m0", "m1", "m2", "m3"];
        let meta: Vec<Response> = models
            .iter()
            .map(|m| Response::success(Round::Meta, *m, "x".repeat(draft_len), 5))
            .collect();
        let gw = MockGateway::new(vec![]).with_response("openai/gpt-4o-mini", Scripted::ok("final"));
        let (_artifact, status) = run_synthesis(
            &store,
            &run_dir,
            &active,
            &meta,
            "q",
            Some(4),
            &identity(),
            Arc::new(gw),
            None,
        )
        .await
        .unwrap();
        assert_eq!(status.details.timeout, 144.0);
        assert_eq!(status.details.max_chars_per_draft, 1200);
    }

    #[tokio::test]
    async fn fails_insufficient_active_below_two() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let run_dir = store.resolve("r1").unwrap();
        let active = vec!["openai/gpt-4o-mini".to_string()];
        let gw = MockGateway::new(vec![]);
        let result =
            run_synthesis(&store, &run_dir, &active, &[], "q", None, &identity(), Arc::new(gw), None).await;
        assert!(matches!(result, Err(OrchestratorError::InsufficientActive(1))));
    }
}
