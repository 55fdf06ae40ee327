//! User-input recorder (C10): validates the incoming `{query, cocktail}`
//! request and writes `01_inputs.json` ahead of activation.

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactStore, RunDir};
use crate::cocktail::CocktailName;
use crate::error::ArtifactError;

/// Raw request body accepted from the HTTP boundary, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub query: String,
    pub cocktail: String,
}

/// Error produced when a `RunRequest` fails validation; the caller maps
/// this to an HTTP 400 before any run directory is created.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("'{0}' is not a valid cocktail name")]
    InvalidCocktail(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsMetadata {
    pub run_id: String,
    pub timestamp: String,
    pub phase: String,
}

/// `01_inputs.json` shape. `ANALYSIS` and `ADDONS` are fixed constants —
/// add-ons are inactive placeholders, never user-facing (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsArtifact {
    #[serde(rename = "QUERY")]
    pub query: String,
    #[serde(rename = "ANALYSIS")]
    pub analysis: String,
    #[serde(rename = "COCKTAIL")]
    pub cocktail: CocktailName,
    #[serde(rename = "ADDONS")]
    pub addons: Vec<String>,
    pub metadata: InputsMetadata,
}

/// Validates trimmed non-empty `query` and a known cocktail name.
pub fn validate(request: &RunRequest) -> Result<(String, CocktailName), ValidationError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let cocktail: CocktailName =
        request.cocktail.parse().map_err(|_| ValidationError::InvalidCocktail(request.cocktail.clone()))?;
    Ok((query.to_string(), cocktail))
}

/// Writes `01_inputs.json`. Callers must validate first via [`validate`].
pub fn record_inputs(
    store: &ArtifactStore,
    run_dir: &RunDir,
    query: &str,
    cocktail: CocktailName,
) -> Result<InputsArtifact, ArtifactError> {
    let artifact = InputsArtifact {
        query: query.to_string(),
        analysis: "Synthesis".to_string(),
        cocktail,
        addons: Vec::new(),
        metadata: InputsMetadata {
            run_id: run_dir.run_id().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            phase: "01_inputs".to_string(),
        },
    };
    store.write(run_dir, "01_inputs", &artifact)?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_query() {
        let req = RunRequest { query: "   ".into(), cocktail: "SPEEDY".into() };
        assert!(matches!(validate(&req), Err(ValidationError::EmptyQuery)));
    }

    #[test]
    fn rejects_unknown_cocktail() {
        let req = RunRequest { query: "hi".into(), cocktail: "NOPE".into() };
        assert!(matches!(validate(&req), Err(ValidationError::InvalidCocktail(_))));
    }

    #[test]
    fn accepts_trimmed_query_and_known_cocktail() {
        let req = RunRequest { query: "  2+2?  ".into(), cocktail: "SPEEDY".into() };
        let (query, cocktail) = validate(&req).unwrap();
        assert_eq!(query, "2+2?");
        assert_eq!(cocktail, CocktailName::Speedy);
    }

    #[test]
    fn record_inputs_fixes_analysis_and_addons() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        let run_dir = store.resolve("run-1").unwrap();
        let artifact = record_inputs(&store, &run_dir, "2+2?", CocktailName::Speedy).unwrap();
        assert_eq!(artifact.analysis, "Synthesis");
        assert!(artifact.addons.is_empty());
        assert!(store.exists(&run_dir, "01_inputs"));
    }
}
