//! Statistics (C8): defensive reader of the three response artifacts,
//! producing `stats.json`. Never fails a run — missing or malformed inputs
//! yield zeros (§4.8).

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactStore, RunDir};
use crate::response::Response;
use crate::synthesis::SynthesisArtifact;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct RoundStats {
    pub count: usize,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsArtifact {
    #[serde(rename = "INITIAL")]
    pub initial: RoundStats,
    #[serde(rename = "META")]
    pub meta: RoundStats,
    #[serde(rename = "ULTRAI")]
    pub ultrai: RoundStats,
}

fn round_stats_from_responses(responses: &[Response]) -> RoundStats {
    let successes: Vec<u64> = responses.iter().filter(|r| !r.is_error()).map(|r| r.ms).collect();
    let avg_ms = if successes.is_empty() { 0.0 } else { successes.iter().sum::<u64>() as f64 / successes.len() as f64 };
    RoundStats { count: responses.len(), avg_ms }
}

/// Reads `03_initial.json`, `04_meta.json`, `05_ultrai.json` (each
/// optional — absence yields a zeroed `RoundStats`) and writes
/// `stats.json`.
pub fn compute_statistics(store: &ArtifactStore, run_dir: &RunDir) -> StatsArtifact {
    let initial: Vec<Response> = store.read(run_dir, "03_initial").unwrap_or_default();
    let meta: Vec<Response> = store.read(run_dir, "04_meta").unwrap_or_default();
    let ultrai: Option<SynthesisArtifact> = store.read(run_dir, "05_ultrai").ok();

    let ultrai_stats = match ultrai {
        Some(a) => RoundStats { count: 1, avg_ms: a.ms as f64 },
        None => RoundStats::default(),
    };

    let stats = StatsArtifact {
        initial: round_stats_from_responses(&initial),
        meta: round_stats_from_responses(&meta),
        ultrai: ultrai_stats,
    };

    // `stats.json` is best-effort bookkeeping; a write failure here must
    // never fail the run (§4.8).
    let _ = store.write(run_dir, "stats", &stats);
    stats
}
