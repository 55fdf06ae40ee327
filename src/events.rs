//! Append-only NDJSON event log (§4.9: `streamEvents`), one line per
//! structured event written to `events.log` inside a run directory.

use serde::Serialize;
use serde_json::Value;

use crate::artifact::{ArtifactStore, RunDir};
use crate::error::ArtifactError;

const EVENTS_FILE: &str = "events.log";

#[derive(Debug, Clone, Serialize)]
struct EventLine<'a> {
    event: &'a str,
    run_id: &'a str,
    timestamp: String,
    #[serde(flatten)]
    fields: Value,
}

/// Appends one NDJSON line: `{event, run_id, timestamp, ...fields}`.
/// `fields` is typically a `serde_json::json!({...})` object; it is
/// flattened into the top-level line. `max_bytes` is `PROD_LOG_MAX_BYTES`
/// (§6); once the current log would cross it, it is rotated to
/// `events.log.1` (overwriting any previous rotation) before the new line
/// is written, so `events.log` never grows unbounded within a long run.
pub fn log_event(
    store: &ArtifactStore,
    run_dir: &RunDir,
    event: &str,
    fields: Value,
    max_bytes: u64,
) -> Result<(), ArtifactError> {
    rotate_if_needed(store, run_dir, max_bytes)?;
    let line = EventLine { event, run_id: run_dir.run_id(), timestamp: chrono::Utc::now().to_rfc3339(), fields };
    let serialized = serde_json::to_string(&line)
        .map_err(|source| ArtifactError::Json { path: EVENTS_FILE.to_string(), source })?;
    store.append_text(run_dir, EVENTS_FILE, &serialized)
}

/// Rotates `events.log` to `events.log.1` if it has already reached
/// `max_bytes`. A concurrent writer that loses the race to rotate still
/// succeeds: `append_text` opens the (possibly just-recreated) file fresh
/// on every call, so at worst one writer's line lands in the rotated file
/// instead of the new one (§9: "writers must tolerate concurrent
/// rotation").
fn rotate_if_needed(store: &ArtifactStore, run_dir: &RunDir, max_bytes: u64) -> Result<(), ArtifactError> {
    if max_bytes == 0 {
        return Ok(());
    }
    let path = run_dir.path().join(EVENTS_FILE);
    let size = match std::fs::metadata(&path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => return Err(ArtifactError::Io { path: path.display().to_string(), source }),
    };
    if size < max_bytes {
        return Ok(());
    }
    let rotated = run_dir.path().join(format!("{EVENTS_FILE}.1"));
    std::fs::rename(&path, &rotated).map_err(|source| ArtifactError::Io { path: path.display().to_string(), source })
}

pub fn read_events(store: &ArtifactStore, run_dir: &RunDir) -> Result<String, ArtifactError> {
    store.read_text(run_dir, EVENTS_FILE)
}
