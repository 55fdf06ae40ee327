//! Run controller (C9, background half): drives C3→C10→C4→C5→C6→C7→C8 in
//! order for one run, gated entirely by artifact presence so progress
//! survives a process restart by re-inspecting the run directory (§4.9).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::activation::activate;
use crate::artifact::{ArtifactStore, RunDir};
use crate::cocktail::CocktailName;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::events::log_event;
use crate::gateway::Gateway;
use crate::initial_round::run_initial_round;
use crate::meta_round::run_meta_round;
use crate::progress::ProgressTracker;
use crate::readiness::check_readiness;
use crate::statistics::compute_statistics;
use crate::synthesis::run_synthesis;
use crate::user_input::record_inputs;

/// `api_<cocktail-lc>_<YYYYMMDD_HHMMSS>`, the controller's default id
/// generator (§3). `now` is injected so it stays deterministic in tests.
pub fn generate_run_id(cocktail: CocktailName, now: chrono::DateTime<chrono::Utc>) -> String {
    format!("api_{}_{}", cocktail.lowercase(), now.format("%Y%m%d_%H%M%S"))
}

/// Ordered artifact stems defining `current_phase` (§4.9: "phase is the
/// highest-numbered artifact present"). `01_inputs` is deliberately excluded:
/// it is bookkeeping written ahead of activation, not a round boundary the
/// status endpoint reports on (S3's literal expectation of `00_ready.json`
/// after an activation failure, despite `01_inputs.json` already existing,
/// only holds if inputs is not itself a phase marker).
const ARTIFACT_ORDER: &[&str] = &[
    "00_ready",
    "02_activate",
    "03_initial",
    "04_meta",
    "05_ultrai",
    "stats",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub phase: String,
    pub round: String,
    pub completed: bool,
    pub failed: bool,
    pub artifacts: Vec<String>,
}

/// Inspects which artifacts exist and infers `{phase, round, completed}`
/// without touching the in-memory progress tracker — the resumability
/// path (§4.9, §5).
pub fn inspect_status(store: &ArtifactStore, run_dir: &RunDir) -> RunStatus {
    let artifacts = store.list_json(run_dir).unwrap_or_default();
    let failed = store.read_text(run_dir, "error.txt").is_ok();

    let mut phase = "created".to_string();
    for stem in ARTIFACT_ORDER {
        if store.exists(run_dir, stem) {
            phase = format!("{stem}.json");
        }
    }

    let round = if store.exists(run_dir, "05_ultrai") {
        "R3"
    } else if store.exists(run_dir, "04_meta") {
        "R3"
    } else if store.exists(run_dir, "03_initial") {
        "R2"
    } else if store.exists(run_dir, "02_activate") {
        "R1"
    } else {
        "activation"
    }
    .to_string();

    RunStatus {
        run_id: run_dir.run_id().to_string(),
        phase,
        round,
        completed: store.exists(run_dir, "05_ultrai"),
        failed,
        artifacts,
    }
}

/// Runs the full C3..C8 pipeline for one run, writing `error.txt` exactly
/// once on any stage failure and never propagating a panic-worthy error to
/// the caller (§4.9 cancellation/fatal-error policy).
pub async fn execute_run(
    store: Arc<ArtifactStore>,
    tracker: Arc<ProgressTracker>,
    gateway: Arc<dyn Gateway>,
    config: Arc<Config>,
    run_id: String,
    query: String,
    cocktail: CocktailName,
) {
    tracker.init_run(&run_id, &["readiness".to_string(), "activation".to_string()]);

    if let Err(err) = run_pipeline(&store, tracker.clone(), gateway, config.as_ref(), &run_id, &query, cocktail).await {
        let run_dir = match store.resolve(&run_id) {
            Ok(d) => d,
            Err(_) => return,
        };
        let message = format!("{}: {err}\n\n{err:?}", err.type_name());
        let _ = store.write_text(&run_dir, "error.txt", &message);
        let _ = log_event(&store, &run_dir, "run_failed", json!({"error": err.to_string()}), config.prod_log_max_bytes);
    }
}

async fn run_pipeline(
    store: &ArtifactStore,
    tracker: Arc<ProgressTracker>,
    gateway: Arc<dyn Gateway>,
    config: &Config,
    run_id: &str,
    query: &str,
    cocktail: CocktailName,
) -> Result<(), OrchestratorError> {
    let run_dir = store.resolve(run_id).map_err(OrchestratorError::from)?;
    let identity = config.identity();

    let max_bytes = config.prod_log_max_bytes;

    tracker.mark_in_progress(run_id, 0);
    log_event(store, &run_dir, "stage_started", json!({"stage": "readiness"}), max_bytes)?;
    let ready = check_readiness(store, &run_dir, config, gateway.as_ref()).await?;
    tracker.mark_completed(run_id, 0, 0.0);
    log_event(store, &run_dir, "stage_completed", json!({"stage": "readiness", "llm_count": ready.llm_count}), max_bytes)?;

    record_inputs(store, &run_dir, query, cocktail)?;

    tracker.mark_in_progress(run_id, 1);
    let activation = activate(store, &run_dir, cocktail, &ready)?;
    tracker.mark_completed(run_id, 1, 0.0);
    log_event(store, &run_dir, "stage_completed", json!({"stage": "activation", "active_list": activation.active_list}), max_bytes)?;

    let initial_run_id = run_id.to_string();
    let tracker_for_initial = tracker.clone();
    let (initial, _initial_status) = run_initial_round(
        store,
        &run_dir,
        &activation,
        query,
        &identity,
        gateway.clone(),
        0,
        Some(Arc::new(move |completed, elapsed| {
            tracker_for_initial.push_milestone(
                &initial_run_id,
                &format!("INITIAL slot {completed} complete ({elapsed:.1}s)"),
                20 + (completed as u8).min(3) * 5,
            );
        })),
    )
    .await?;
    log_event(store, &run_dir, "stage_completed", json!({"stage": "r1", "count": initial.len()}), max_bytes)?;

    let (meta, meta_status) =
        run_meta_round(store, &run_dir, &initial, query, &identity, gateway.clone(), 0, None).await?;
    log_event(store, &run_dir, "stage_completed", json!({"stage": "r2", "count": meta.len()}), max_bytes)?;

    let run_id_owned = run_id.to_string();
    let tracker_for_synthesis = tracker.clone();
    let (synthesis, _synthesis_status) = run_synthesis(
        store,
        &run_dir,
        &activation.active_list,
        &meta,
        query,
        Some(meta_status.concurrency_limit),
        &identity,
        gateway,
        Some(Arc::new(move |text, percent| {
            tracker_for_synthesis.push_milestone(&run_id_owned, text, percent);
        })),
    )
    .await?;
    log_event(store, &run_dir, "stage_completed", json!({"stage": "r3", "model": synthesis.model}), max_bytes)?;

    compute_statistics(store, &run_dir);
    tracker.set_percentage(run_id, 100);
    log_event(store, &run_dir, "run_completed", json!({}), max_bytes)?;

    Ok(())
}
