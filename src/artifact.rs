//! Per-run artifact store (C1): path-sandboxed JSON read/write under
//! `runs/<RunId>/`. Downstream stages never hand results to each other in
//! memory — they write here and the next stage reads it back, which is what
//! makes the pipeline resumable and auditable.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ArtifactError;

/// A run id is restricted to `[A-Za-z0-9_-]+`; this also forbids `.`, `/`
/// and `\` implicitly since none of those are in the allowed set.
pub fn validate_run_id(run_id: &str) -> Result<(), ArtifactError> {
    let valid = !run_id.is_empty()
        && run_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidRunId(run_id.to_string()))
    }
}

/// A validated, sandboxed run directory. Only constructible via
/// [`ArtifactStore::resolve`].
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
    run_id: String,
}

impl RunDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

/// Store of record for all run artifacts, rooted at an absolute base
/// directory (`runs/` by default). Every path it hands out or accepts is
/// re-verified to remain a descendant of that base (§8 invariant 9).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base: PathBuf,
}

impl ArtifactStore {
    /// `base` need not exist yet; it is created lazily on first write.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn trusted_base(&self) -> Result<PathBuf, ArtifactError> {
        // The base itself may not exist yet on a cold start; canonicalize
        // what does exist and rebuild the rest, rather than failing.
        if self.base.exists() {
            self.base.canonicalize().map_err(|source| ArtifactError::Io {
                path: self.base.display().to_string(),
                source,
            })
        } else {
            Ok(absolute_lexically(&self.base))
        }
    }

    /// Resolve a run id to a sandboxed `RunDir`. Fails if the id contains
    /// forbidden characters or if the resolved absolute path would escape
    /// the trusted base (defense in depth beyond the character whitelist).
    pub fn resolve(&self, run_id: &str) -> Result<RunDir, ArtifactError> {
        validate_run_id(run_id)?;
        let base = self.trusted_base()?;
        let candidate = absolute_lexically(&base.join(run_id));
        if !candidate.starts_with(&base) {
            return Err(ArtifactError::PathEscape(run_id.to_string()));
        }
        Ok(RunDir { path: candidate, run_id: run_id.to_string() })
    }

    /// Write `value` as `<name>.json` inside `run_dir`, atomically
    /// (write to a sibling temp file, then rename).
    pub fn write<T: Serialize>(
        &self,
        run_dir: &RunDir,
        name: &str,
        value: &T,
    ) -> Result<(), ArtifactError> {
        valid_artifact_name(name)?;
        std::fs::create_dir_all(run_dir.path()).map_err(|source| ArtifactError::Io {
            path: run_dir.path().display().to_string(),
            source,
        })?;
        let final_path = run_dir.path().join(format!("{name}.json"));
        let tmp_path = run_dir.path().join(format!(".{name}.json.tmp"));
        let body = serde_json::to_vec_pretty(value).map_err(|source| ArtifactError::Json {
            path: final_path.display().to_string(),
            source,
        })?;
        std::fs::write(&tmp_path, body).map_err(|source| ArtifactError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp_path, &final_path).map_err(|source| ArtifactError::Io {
            path: final_path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// Read and deserialize `<name>.json` from `run_dir`.
    pub fn read<T: DeserializeOwned>(&self, run_dir: &RunDir, name: &str) -> Result<T, ArtifactError> {
        valid_artifact_name(name)?;
        let path = run_dir.path().join(format!("{name}.json"));
        let bytes = std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound { run_id: run_dir.run_id().to_string(), name: name.to_string() }
            } else {
                ArtifactError::Io { path: path.display().to_string(), source }
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn exists(&self, run_dir: &RunDir, name: &str) -> bool {
        valid_artifact_name(name).is_ok() && run_dir.path().join(format!("{name}.json")).exists()
    }

    /// Write a plain-text file (used for `error.txt`, append lines to
    /// `events.log`). `name` here is the literal filename, not a stem.
    pub fn write_text(&self, run_dir: &RunDir, filename: &str, contents: &str) -> Result<(), ArtifactError> {
        std::fs::create_dir_all(run_dir.path()).map_err(|source| ArtifactError::Io {
            path: run_dir.path().display().to_string(),
            source,
        })?;
        let path = run_dir.path().join(filename);
        std::fs::write(&path, contents).map_err(|source| ArtifactError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn append_text(&self, run_dir: &RunDir, filename: &str, line: &str) -> Result<(), ArtifactError> {
        use std::io::Write;
        std::fs::create_dir_all(run_dir.path()).map_err(|source| ArtifactError::Io {
            path: run_dir.path().display().to_string(),
            source,
        })?;
        let path = run_dir.path().join(filename);
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ArtifactError::Io { path: path.display().to_string(), source })?;
        writeln!(f, "{line}").map_err(|source| ArtifactError::Io { path: path.display().to_string(), source })
    }

    pub fn read_text(&self, run_dir: &RunDir, filename: &str) -> Result<String, ArtifactError> {
        let path = run_dir.path().join(filename);
        std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound { run_id: run_dir.run_id().to_string(), name: filename.to_string() }
            } else {
                ArtifactError::Io { path: path.display().to_string(), source }
            }
        })
    }

    /// List `*.json` artifact file names present in `run_dir`, sorted.
    pub fn list_json(&self, run_dir: &RunDir) -> Result<Vec<String>, ArtifactError> {
        let mut names = Vec::new();
        if !run_dir.path().exists() {
            return Ok(names);
        }
        let entries = std::fs::read_dir(run_dir.path()).map_err(|source| ArtifactError::Io {
            path: run_dir.path().display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ArtifactError::Io {
                path: run_dir.path().display().to_string(),
                source,
            })?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.ends_with(".json") {
                names.push(name.into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn run_dir_exists(&self, run_dir: &RunDir) -> bool {
        run_dir.path().exists()
    }
}

/// A lexical (no filesystem access) absolute-path normalization: resolves
/// `.` and `..` components against the given root without requiring the
/// path to exist. Used so `resolve()` can validate a run id before the
/// run directory has been created.
fn absolute_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Artifact names are restricted to non-empty `[A-Za-z0-9_]+` stems (the
/// `.json` suffix is appended by the store, never accepted from a caller).
fn valid_artifact_name(name: &str) -> Result<(), ArtifactError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ArtifactError::InvalidArtifactName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (ArtifactStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (ArtifactStore::new(dir.path().to_path_buf()), dir)
    }

    #[test]
    fn rejects_run_id_with_path_traversal() {
        let (store, _dir) = temp_store();
        assert!(store.resolve("../escape").is_err());
        assert!(store.resolve("a/b").is_err());
        assert!(store.resolve("a.b").is_err());
        assert!(store.resolve("a\\b").is_err());
    }

    #[test]
    fn accepts_well_formed_run_id() {
        let (store, _dir) = temp_store();
        assert!(store.resolve("api_speedy_20260101_120000").is_ok());
    }

    #[test]
    fn resolved_path_stays_under_base() {
        let (store, dir) = temp_store();
        let run_dir = store.resolve("run-1").unwrap();
        assert!(run_dir.path().starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let (store, _dir) = temp_store();
        let run_dir = store.resolve("run-1").unwrap();
        let value = json!({"a": 1, "b": [1, 2, 3]});
        store.write(&run_dir, "00_ready", &value).unwrap();
        let back: serde_json::Value = store.read(&run_dir, "00_ready").unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn exists_false_before_write_true_after() {
        let (store, _dir) = temp_store();
        let run_dir = store.resolve("run-1").unwrap();
        assert!(!store.exists(&run_dir, "00_ready"));
        store.write(&run_dir, "00_ready", &json!({})).unwrap();
        assert!(store.exists(&run_dir, "00_ready"));
    }

    #[test]
    fn rejects_non_alphanumeric_artifact_name() {
        let (store, _dir) = temp_store();
        let run_dir = store.resolve("run-1").unwrap();
        assert!(store.write(&run_dir, "../escape", &json!({})).is_err());
        assert!(store.read::<serde_json::Value>(&run_dir, "foo.bar").is_err());
    }

    #[test]
    fn list_json_only_includes_json_files() {
        let (store, _dir) = temp_store();
        let run_dir = store.resolve("run-1").unwrap();
        store.write(&run_dir, "00_ready", &json!({})).unwrap();
        store.write_text(&run_dir, "error.txt", "boom").unwrap();
        let names = store.list_json(&run_dir).unwrap();
        assert_eq!(names, vec!["00_ready.json".to_string()]);
    }
}
