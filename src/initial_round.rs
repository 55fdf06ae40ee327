//! R1 executor (C5): bounded fan-out over the cocktail's PRIMARY (post-
//! activation) slots, with per-slot PRIMARY→FALLBACK failover (§4.5).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::activation::ActivateArtifact;
use crate::artifact::{ArtifactStore, RunDir};
use crate::cocktail::concurrency_limit;
use crate::error::{ArtifactError, OrchestratorError};
use crate::gateway::{ChatMessage, ChatRequest, Gateway, Identity, Timeouts};
use crate::response::{Response, Round};
use crate::stage_fanout::{fan_out, ProgressCallback};

const ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialStatus {
    pub count: usize,
    pub models: Vec<String>,
    pub failed_models: Vec<String>,
    pub concurrency_limit: usize,
}

struct Slot {
    primary: String,
    backup: Option<String>,
}

/// Runs R1. `attachment_count` feeds §4.5's concurrency formula (this crate
/// never ingests attachments over the wire, so callers pass `0`; the
/// parameter exists so the formula is exercised exactly as specified).
pub async fn run_initial_round(
    store: &ArtifactStore,
    run_dir: &RunDir,
    activation: &ActivateArtifact,
    query: &str,
    identity: &Identity,
    gateway: Arc<dyn Gateway>,
    attachment_count: usize,
    on_progress: Option<ProgressCallback>,
) -> Result<(Vec<Response>, InitialStatus), OrchestratorError> {
    let slots: Vec<Slot> = activation
        .active_list
        .iter()
        .enumerate()
        .map(|(i, primary)| Slot {
            primary: primary.clone(),
            backup: activation.backup_list.get(i).cloned(),
        })
        .collect();

    let concurrency = concurrency_limit(attachment_count, activation.active_list.len());
    let identity = identity.clone();
    let query = query.to_string();

    let responses = fan_out(
        slots,
        concurrency,
        move |slot| {
            let gateway = gateway.clone();
            let identity = identity.clone();
            let query = query.clone();
            async move { run_slot(gateway, &identity, &query, slot).await }
        },
        on_progress,
    )
    .await;

    let failed_models: Vec<String> =
        responses.iter().filter(|r| r.is_error()).map(|r| r.model.clone()).collect();

    // The realized response model ids, not the pre-R1 resolved PRIMARY ids —
    // a slot that failed over to its backup is identified by the backup
    // that actually answered (§4.5).
    let models: Vec<String> = responses.iter().map(|r| r.model.clone()).collect();

    let status = InitialStatus {
        count: responses.len(),
        models,
        failed_models,
        concurrency_limit: concurrency,
    };

    store
        .write(run_dir, "03_initial", &responses)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;
    store
        .write(run_dir, "03_initial_status", &status)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;

    Ok((responses, status))
}

async fn run_slot(gateway: Arc<dyn Gateway>, identity: &Identity, query: &str, slot: Slot) -> Response {
    let request = ChatRequest { model: slot.primary.clone(), messages: vec![ChatMessage::user(query)] };
    match gateway.chat(&request, identity, Timeouts::primary(), ATTEMPTS).await {
        Ok(reply) => Response::success(Round::Initial, &slot.primary, reply.text, reply.elapsed_ms),
        Err(primary_err) => {
            let Some(backup) = slot.backup else {
                return Response::failure(
                    Round::Initial,
                    &slot.primary,
                    format!("Primary failed ({primary_err})"),
                );
            };
            let backup_request = ChatRequest { model: backup.clone(), messages: vec![ChatMessage::user(query)] };
            match gateway.chat(&backup_request, identity, Timeouts::primary(), ATTEMPTS).await {
                Ok(reply) => Response::success(Round::Initial, &backup, reply.text, reply.elapsed_ms),
                Err(backup_err) => Response::failure(
                    Round::Initial,
                    &slot.primary,
                    format!("Primary failed ({primary_err}), Backup failed ({backup_err})"),
                ),
            }
        }
    }
}
