//! Run controller / API (C9, HTTP half): the axum router exposed in §6.
//! `startRun` schedules the pipeline as a background task and returns
//! immediately; every other endpoint is a read against either the artifact
//! store or the in-memory progress tracker.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::Method;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::error::ApiError;
use crate::events::read_events;
use crate::gateway::Gateway;
use crate::orchestrator::{execute_run, generate_run_id, inspect_status};
use crate::progress::ProgressTracker;
use crate::user_input::{validate, RunRequest};

/// Shared state handed to every handler. Cloned per request (cheap — every
/// field is an `Arc`), never locked except inside [`ProgressTracker`]
/// itself (§5: "the in-memory progress map is the only cross-request
/// mutable state").
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ArtifactStore>,
    pub tracker: Arc<ProgressTracker>,
    pub gateway: Arc<dyn Gateway>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.config.frontend_origin.parse::<axum::http::HeaderValue>().expect("valid origin"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(health))
        .route("/runs", post(start_run))
        .route("/runs/{id}/status", get(get_status))
        .route("/runs/{id}/artifacts", get(list_artifacts))
        .route("/runs/{id}/artifacts/{name}", get(get_artifact))
        .route("/runs/{id}/error", get(get_error))
        .route("/runs/{id}/events", get(get_events))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct StartRunBody {
    query: String,
    cocktail: String,
}

#[derive(Debug, Serialize)]
struct StartRunResponse {
    run_id: String,
}

/// `startRun`: validates inputs synchronously (§4.10), allocates a run id,
/// schedules the pipeline as a background task, and returns immediately. A
/// missing credential is refused here rather than inside the background
/// task, so the caller never has to poll a run that could not start (§7).
async fn start_run(
    State(state): State<AppState>,
    Json(body): Json<StartRunBody>,
) -> Result<Json<StartRunResponse>, ApiError> {
    let request = RunRequest { query: body.query, cocktail: body.cocktail };
    let (query, cocktail) = validate(&request).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Config::from_env already refused a missing credential before the
    // server started (§7), but re-validate here defensively in case a
    // future caller constructs AppState with a credential-less Config.
    if state.config.api_key.trim().is_empty() {
        return Err(ApiError::BadRequest("missing OPENROUTER_API_KEY".to_string()));
    }

    let run_id = generate_run_id(cocktail, chrono::Utc::now());

    tokio::spawn(execute_run(
        state.store.clone(),
        state.tracker.clone(),
        state.gateway.clone(),
        state.config.clone(),
        run_id.clone(),
        query,
        cocktail,
    ));

    Ok(Json(StartRunResponse { run_id }))
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    run_id: String,
    phase: String,
    round: String,
    completed: bool,
    failed: bool,
    artifacts: Vec<String>,
    steps: Vec<crate::progress::Step>,
    progress: u8,
    last_update: Option<String>,
}

/// `getStatus`: artifact inspection (phase/round/completed) merged with
/// whatever the in-memory tracker still remembers about this run's steps.
/// A run id that has neither a tracker entry nor a run directory is
/// reported 404 — it was never started.
async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let run_dir = state.store.resolve(&id).map_err(ApiError::from)?;
    let snapshot = state.tracker.snapshot(&id);
    if !state.store.run_dir_exists(&run_dir) && snapshot.is_none() {
        return Err(ApiError::NotFound(format!("run '{id}' not found")));
    }

    let status = inspect_status(&state.store, &run_dir);
    let (steps, progress, last_update) = match snapshot {
        Some(s) => (s.steps, s.percentage, Some(s.last_update)),
        None => (Vec::new(), if status.completed { 100 } else { 0 }, None),
    };

    Ok(Json(StatusResponse {
        run_id: status.run_id,
        phase: status.phase,
        round: status.round,
        completed: status.completed,
        failed: status.failed,
        artifacts: status.artifacts,
        steps,
        progress,
        last_update,
    }))
}

#[derive(Debug, Serialize)]
struct ArtifactsResponse {
    run_id: String,
    files: Vec<String>,
}

async fn list_artifacts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ArtifactsResponse>, ApiError> {
    let run_dir = state.store.resolve(&id).map_err(ApiError::from)?;
    if !state.store.run_dir_exists(&run_dir) {
        return Err(ApiError::NotFound(format!("run '{id}' not found")));
    }
    let files = state.store.list_json(&run_dir).map_err(ApiError::from)?;
    Ok(Json(ArtifactsResponse { run_id: id, files }))
}

/// `getArtifact`: `{name}` must be `<stem>.json` where `<stem>` is itself a
/// valid artifact name (§4.1); anything else is a 400, not a 404, because
/// it never reaches the filesystem (§7 integrity errors).
async fn get_artifact(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let run_dir = state.store.resolve(&id).map_err(ApiError::from)?;
    let stem = name
        .strip_suffix(".json")
        .ok_or_else(|| ApiError::BadRequest(format!("artifact name '{name}' must end in .json")))?;
    let value: Value = state.store.read(&run_dir, stem).map_err(ApiError::from)?;
    Ok(Json(value))
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    run_id: String,
    error: String,
}

async fn get_error(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ErrorResponse>, ApiError> {
    let run_dir = state.store.resolve(&id).map_err(ApiError::from)?;
    let error = state.store.read_text(&run_dir, "error.txt").map_err(ApiError::from)?;
    Ok(Json(ErrorResponse { run_id: id, error }))
}

/// `streamEvents`: this core returns the accumulated NDJSON log as one
/// text body rather than an actual streaming response (§1 non-goals: "no
/// streaming token delivery" — the same rule applies to the event feed).
async fn get_events(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let run_dir = state.store.resolve(&id).map_err(ApiError::from)?;
    let body = read_events(&state.store, &run_dir).map_err(ApiError::from)?;
    Ok(([(axum::http::header::CONTENT_TYPE, "text/plain")], body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cocktail::PRIMARY_SPEEDY;
    use crate::gateway::mock::Scripted;
    use crate::gateway::MockGateway;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut gw = MockGateway::new(PRIMARY_SPEEDY.to_vec().into_iter().map(String::from).collect());
        for p in PRIMARY_SPEEDY {
            gw = gw.with_response(p, Scripted::ok(format!("draft from {p}")));
        }
        let state = AppState {
            store: Arc::new(ArtifactStore::new(dir.path().to_path_buf())),
            tracker: Arc::new(ProgressTracker::new()),
            gateway: Arc::new(gw),
            config: Arc::new(Config {
                api_key: "k".into(),
                site_url: "http://localhost".into(),
                site_name: "test".into(),
                runs_base: dir.path().to_path_buf(),
                log_json: false,
                prod_log_max_bytes: 1,
                frontend_origin: "http://localhost:3000".into(),
            }),
        };
        (state, dir)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn start_run_rejects_empty_query() {
        let (state, _dir) = test_state();
        let app = router(state);
        let body = serde_json::to_vec(&json!({"query": "   ", "cocktail": "SPEEDY"})).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/runs")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_run_status_is_404() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/runs/does-not-exist/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn path_traversal_run_id_is_bad_request() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/runs/..%2F..%2Fetc/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status() == StatusCode::BAD_REQUEST || response.status() == StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_run_then_status_eventually_completes() {
        let (state, _dir) = test_state();
        let tracker = state.tracker.clone();
        let store = state.store.clone();
        let app = router(state.clone());
        let body = serde_json::to_vec(&json!({"query": "2+2?", "cocktail": "SPEEDY"})).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/runs")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        let run_id = parsed["run_id"].as_str().unwrap().to_string();

        for _ in 0..200 {
            let run_dir = store.resolve(&run_id).unwrap();
            if store.exists(&run_dir, "05_ultrai") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let run_dir = store.resolve(&run_id).unwrap();
        assert!(store.exists(&run_dir, "05_ultrai"));
        let _ = tracker.snapshot(&run_id);
    }
}
