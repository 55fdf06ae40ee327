//! Activation resolver (C4): intersects the ready list with a cocktail's
//! PRIMARY/FALLBACK tables to produce exactly `N` active slots (§4.4).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactStore, RunDir};
use crate::cocktail::{CocktailName, N, QUORUM};
use crate::error::{ArtifactError, OrchestratorError};
use crate::readiness::ReadyArtifact;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateArtifact {
    #[serde(rename = "activeList")]
    pub active_list: Vec<String>,
    #[serde(rename = "backupList")]
    pub backup_list: Vec<String>,
    pub quorum: usize,
    pub cocktail: CocktailName,
    pub reasons: HashMap<String, String>,
}

/// Resolves each of the `N` PRIMARY slots per §4.4's four-step rule, then
/// writes `02_activate.json`. Fails with `CocktailUnsatisfiable` if fewer
/// than `N` slots could be filled, or `InsufficientActive` if the filled
/// count is below quorum.
pub fn activate(
    store: &ArtifactStore,
    run_dir: &RunDir,
    cocktail: CocktailName,
    ready: &ReadyArtifact,
) -> Result<ActivateArtifact, OrchestratorError> {
    let (primary, fallback) = cocktail.models();
    let ready_set: std::collections::HashSet<&str> = ready.ready_list.iter().map(String::as_str).collect();

    let mut active_list = Vec::with_capacity(N);
    let mut reasons = HashMap::with_capacity(N);
    let mut chosen: std::collections::HashSet<&str> = std::collections::HashSet::new();

    for i in 0..N {
        let slot_key = primary[i].to_string();
        if ready_set.contains(primary[i]) && !chosen.contains(primary[i]) {
            chosen.insert(primary[i]);
            active_list.push(primary[i].to_string());
            reasons.insert(slot_key, "PRIMARY_READY".to_string());
            continue;
        }
        if ready_set.contains(fallback[i]) && !chosen.contains(fallback[i]) {
            chosen.insert(fallback[i]);
            active_list.push(fallback[i].to_string());
            reasons.insert(slot_key, format!("REPLACED_FALLBACK:{}", fallback[i]));
            continue;
        }
        let alt = primary
            .iter()
            .chain(fallback.iter())
            .find(|id| ready_set.contains(**id) && !chosen.contains(**id));
        if let Some(alt) = alt {
            chosen.insert(alt);
            active_list.push(alt.to_string());
            reasons.insert(slot_key, format!("REPLACED_ALT:{alt}"));
            continue;
        }
        reasons.insert(slot_key, "NOT_READY_NO_REPLACEMENT".to_string());
    }

    if active_list.len() < N {
        return Err(OrchestratorError::CocktailUnsatisfiable { filled: active_list.len(), needed: N });
    }
    if active_list.len() < QUORUM {
        return Err(OrchestratorError::InsufficientActive(active_list.len()));
    }

    let backup_list: Vec<String> = fallback
        .iter()
        .filter(|id| ready_set.contains(**id) && !chosen.contains(**id))
        .map(|id| id.to_string())
        .collect();

    let artifact = ActivateArtifact { active_list, backup_list, quorum: QUORUM, cocktail, reasons };

    store
        .write(run_dir, "02_activate", &artifact)
        .map_err(ArtifactError::from)
        .map_err(OrchestratorError::from)?;

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cocktail::{FALLBACK_SPEEDY, PRIMARY_SPEEDY};

    fn ready(list: Vec<&str>) -> ReadyArtifact {
        ReadyArtifact {
            run_id: "r".into(),
            ready_list: list.into_iter().map(String::from).collect(),
            status: "READY".into(),
            llm_count: 0,
            timestamp: "now".into(),
        }
    }

    fn store() -> (ArtifactStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (ArtifactStore::new(dir.path().to_path_buf()), dir)
    }

    #[test]
    fn all_primaries_ready_yields_primary_ready_reasons() {
        let (store, _dir) = store();
        let run_dir = store.resolve("r1").unwrap();
        let ready = ready(PRIMARY_SPEEDY.to_vec());
        let artifact = activate(&store, &run_dir, CocktailName::Speedy, &ready).unwrap();
        assert_eq!(artifact.active_list, PRIMARY_SPEEDY.to_vec());
        for p in PRIMARY_SPEEDY {
            assert_eq!(artifact.reasons[p], "PRIMARY_READY");
        }
        assert!(artifact.backup_list.is_empty());
    }

    #[test]
    fn missing_primary_swaps_in_aligned_fallback() {
        let (store, _dir) = store();
        let run_dir = store.resolve("r1").unwrap();
        let mut list: Vec<&str> = PRIMARY_SPEEDY[1..].to_vec();
        list.push(FALLBACK_SPEEDY[0]);
        let ready = ready(list);
        let artifact = activate(&store, &run_dir, CocktailName::Speedy, &ready).unwrap();
        assert_eq!(artifact.active_list[0], FALLBACK_SPEEDY[0]);
        assert_eq!(artifact.reasons[PRIMARY_SPEEDY[0]], format!("REPLACED_FALLBACK:{}", FALLBACK_SPEEDY[0]));
    }

    #[test]
    fn no_primary_or_fallback_available_is_unsatisfiable() {
        let (store, _dir) = store();
        let run_dir = store.resolve("r1").unwrap();
        let ready = ready(vec![PRIMARY_SPEEDY[0], PRIMARY_SPEEDY[1]]);
        let result = activate(&store, &run_dir, CocktailName::Speedy, &ready);
        assert!(matches!(result, Err(OrchestratorError::CocktailUnsatisfiable { filled: 2, needed: 3 })));
    }

    #[test]
    fn alt_replacement_pulls_from_union_when_aligned_fallback_absent() {
        let (store, _dir) = store();
        let run_dir = store.resolve("r1").unwrap();
        // Slot 2's own fallback is absent, but slot 0's fallback is ready and unused.
        let ready = ready(vec![PRIMARY_SPEEDY[0], PRIMARY_SPEEDY[1], FALLBACK_SPEEDY[0]]);
        let artifact = activate(&store, &run_dir, CocktailName::Speedy, &ready).unwrap();
        assert_eq!(artifact.active_list.len(), N);
        assert_eq!(artifact.reasons[PRIMARY_SPEEDY[2]], format!("REPLACED_ALT:{}", FALLBACK_SPEEDY[0]));
    }

    #[test]
    fn backup_list_excludes_consumed_fallbacks() {
        let (store, _dir) = store();
        let run_dir = store.resolve("r1").unwrap();
        let mut list = PRIMARY_SPEEDY.to_vec();
        list.push(FALLBACK_SPEEDY[0]);
        list.push(FALLBACK_SPEEDY[1]);
        let ready = ready(list);
        let artifact = activate(&store, &run_dir, CocktailName::Speedy, &ready).unwrap();
        assert_eq!(artifact.backup_list, vec![FALLBACK_SPEEDY[0].to_string(), FALLBACK_SPEEDY[1].to_string()]);
    }
}
