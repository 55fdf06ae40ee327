//! R2 executor (C6): each live R1 model revises its draft after reviewing
//! the full, untruncated peer context (§4.6).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactStore, RunDir};
use crate::cocktail::concurrency_limit;
use crate::error::{ArtifactError, OrchestratorError};
use crate::gateway::{ChatMessage, ChatRequest, Gateway, Identity, Timeouts};
use crate::response::{Response, Round};
use crate::stage_fanout::{fan_out, ProgressCallback};

const ATTEMPTS: u32 = 2;
const INSTRUCTION: &str = "Do not assume any response is true. Review your peers' INITIAL drafts below. \
Revise your answer accordingly. List contradictions you resolved and what changed.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaStatus {
    pub count: usize,
    pub models: Vec<String>,
    pub concurrency_limit: usize,
}

/// Live R2 membership: models whose R1 response was not an error (§4.6).
pub fn live_membership(initial: &[Response]) -> Vec<String> {
    initial.iter().filter(|r| !r.is_error()).map(|r| r.model.clone()).collect()
}

fn build_peer_context(initial: &[Response]) -> String {
    initial
        .iter()
        .map(|r| if r.is_error() { format!("- {}: ERROR", r.model) } else { format!("- {}: {}", r.model, r.text) })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub async fn run_meta_round(
    store: &ArtifactStore,
    run_dir: &RunDir,
    initial: &[Response],
    query: &str,
    identity: &Identity,
    gateway: Arc<dyn Gateway>,
    attachment_count: usize,
    on_progress: Option<ProgressCallback>,
) -> Result<(Vec<Response>, MetaStatus), OrchestratorError> {
    let members = live_membership(initial);
    if members.len() < 2 {
        return Err(OrchestratorError::InsufficientPeers(members.len()));
    }

    let peer_context = build_peer_context(initial);
    let concurrency = concurrency_limit(attachment_count, members.len());

    let user_prompt = format!(
        "{INSTRUCTION}\n\nORIGINAL QUERY:\n{query}\n\nPEER DRAFTS (INITIAL ROUND):\n{peer_context}"
    );
    let identity = identity.clone();

    let responses = fan_out(
        members.clone(),
        concurrency,
        move |model| {
            let gateway = gateway.clone();
            let identity = identity.clone();
            let user_prompt = user_prompt.clone();
            async move { run_slot(gateway, &identity, &user_prompt, model).await }
        },
        on_progress,
    )
    .await;

    let status = MetaStatus { count: responses.len(), models: members, concurrency_limit: concurrency };

    store
        .write(run_dir, "04_meta", &responses)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;
    store
        .write(run_dir, "04_meta_status", &status)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;

    Ok((responses, status))
}

async fn run_slot(gateway: Arc<dyn Gateway>, identity: &Identity, user_prompt: &str, model: String) -> Response {
    let request = ChatRequest {
        model: model.clone(),
        messages: vec![
            ChatMessage::system("You are in the META revision round (R2)."),
            ChatMessage::user(user_prompt),
        ],
    };
    match gateway.chat(&request, identity, Timeouts::meta(), ATTEMPTS).await {
        Ok(reply) => Response::success(Round::Meta, &model, reply.text, reply.elapsed_ms),
        Err(e) => Response::failure(Round::Meta, &model, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{MockFailure, Scripted};
    use crate::gateway::MockGateway;

    fn identity() -> Identity {
        Identity { api_key: "k".into(), site_url: "http://localhost".into(), site_name: "test".into() }
    }

    fn drafts() -> Vec<Response> {
        vec![
            Response::success(Round::Initial, "a", "draft a", 10),
            Response::success(Round::Initial, "b", "draft b", 10),
            Response::failure(Round::Initial, "c", "Primary failed, Backup failed"),
        ]
    }

    #[test]
    fn live_membership_excludes_errored_model() {
        let members = live_membership(&drafts());
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn fails_insufficient_peers_below_two() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let run_dir = store.resolve("r1").unwrap();
        let only_one = vec![Response::success(Round::Initial, "a", "draft", 1)];
        let gw = MockGateway::new(vec![]);
        let result =
            run_meta_round(&store, &run_dir, &only_one, "q", &identity(), Arc::new(gw), 0, None).await;
        assert!(matches!(result, Err(OrchestratorError::InsufficientPeers(1))));
    }

    #[tokio::test]
    async fn revises_every_live_member_and_preserves_identity_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let run_dir = store.resolve("r1").unwrap();
        let gw = MockGateway::new(vec![])
            .with_response("a", Scripted::ok("revised a"))
            .with_response("b", Scripted::fail(MockFailure::ServerError));
        let (responses, status) =
            run_meta_round(&store, &run_dir, &drafts(), "q", &identity(), Arc::new(gw), 0, None)
                .await
                .unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(status.count, 2);
        assert!(responses.iter().any(|r| r.model == "a" && !r.is_error()));
        assert!(responses.iter().any(|r| r.model == "b" && r.is_error()));
    }
}
