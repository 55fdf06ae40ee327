//! In-memory progress tracker (§3/§4.9/§5): a process-wide map from run id
//! to a steps list, guarded by a single mutex — the only cross-request
//! mutable state in the crate besides the gateway's own connection pool.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    pub status: StepStatus,
    pub progress: u8,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub steps: Vec<Step>,
    pub percentage: u8,
    pub last_update: String,
}

impl ProgressSnapshot {
    fn new() -> Self {
        Self { steps: Vec::new(), percentage: 0, last_update: now() }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Best-effort, memory-only. If the process restarts mid-run, a caller
/// falls back to artifact inspection (§4.9) rather than this tracker.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    runs: Mutex<HashMap<String, ProgressSnapshot>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self { runs: Mutex::new(HashMap::new()) }
    }

    /// Pre-populates one `pending` step per name, in order.
    pub fn init_run(&self, run_id: &str, step_texts: &[String]) {
        let mut snapshot = ProgressSnapshot::new();
        for text in step_texts {
            snapshot.steps.push(Step {
                text: text.clone(),
                status: StepStatus::Pending,
                progress: 0,
                timestamp: now(),
                time: None,
            });
        }
        self.runs.lock().unwrap().insert(run_id.to_string(), snapshot);
    }

    pub fn mark_in_progress(&self, run_id: &str, step_index: usize) {
        let mut runs = self.runs.lock().unwrap();
        if let Some(snapshot) = runs.get_mut(run_id) {
            if let Some(step) = snapshot.steps.get_mut(step_index) {
                step.status = StepStatus::InProgress;
                step.timestamp = now();
            }
            snapshot.last_update = now();
        }
    }

    pub fn mark_completed(&self, run_id: &str, step_index: usize, elapsed_secs: f64) {
        let mut runs = self.runs.lock().unwrap();
        if let Some(snapshot) = runs.get_mut(run_id) {
            if let Some(step) = snapshot.steps.get_mut(step_index) {
                step.status = StepStatus::Completed;
                step.progress = 100;
                step.timestamp = now();
                step.time = Some(elapsed_secs);
            }
            snapshot.last_update = now();
        }
    }

    /// Appends a wrapper step (readiness, activation, R3 sub-phases,
    /// stats, delivery) reported at a fixed percentage milestone rather
    /// than tied to a model slot.
    pub fn push_milestone(&self, run_id: &str, text: &str, percentage: u8) {
        let mut runs = self.runs.lock().unwrap();
        let snapshot = runs.entry(run_id.to_string()).or_insert_with(ProgressSnapshot::new);
        snapshot.steps.push(Step {
            text: text.to_string(),
            status: StepStatus::Completed,
            progress: 100,
            timestamp: now(),
            time: None,
        });
        snapshot.percentage = percentage;
        snapshot.last_update = now();
    }

    pub fn set_percentage(&self, run_id: &str, percentage: u8) {
        let mut runs = self.runs.lock().unwrap();
        if let Some(snapshot) = runs.get_mut(run_id) {
            snapshot.percentage = percentage;
            snapshot.last_update = now();
        }
    }

    pub fn snapshot(&self, run_id: &str) -> Option<ProgressSnapshot> {
        self.runs.lock().unwrap().get(run_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_run_prepopulates_pending_steps() {
        let tracker = ProgressTracker::new();
        tracker.init_run("r1", &["a".to_string(), "b".to_string()]);
        let snapshot = tracker.snapshot("r1").unwrap();
        assert_eq!(snapshot.steps.len(), 2);
        assert!(snapshot.steps.iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn mark_completed_sets_progress_and_time() {
        let tracker = ProgressTracker::new();
        tracker.init_run("r1", &["a".to_string()]);
        tracker.mark_in_progress("r1", 0);
        tracker.mark_completed("r1", 0, 1.5);
        let snapshot = tracker.snapshot("r1").unwrap();
        assert_eq!(snapshot.steps[0].status, StepStatus::Completed);
        assert_eq!(snapshot.steps[0].time, Some(1.5));
    }

    #[test]
    fn unknown_run_id_yields_no_snapshot() {
        let tracker = ProgressTracker::new();
        assert!(tracker.snapshot("missing").is_none());
    }
}
