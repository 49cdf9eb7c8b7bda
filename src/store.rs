//! Artifact persistence and the host-side handle to the currently loaded model.
//!
//! Writes go through `atomic_write` (temp file in the same directory, fsync,
//! rename), so a concurrent reader sees either the previous artifact or the new
//! one in full.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::error::{CredibilityError, Result};
use crate::model::ModelArtifact;

pub const DEFAULT_ARTIFACT_PATH: &str = "artifacts/model.json";

/// Replace `target` with `content` without ever exposing a partial file.
pub fn atomic_write(target: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    // Same directory, so the rename never crosses filesystems
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        target.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));

    let written = (|| {
        let mut f = fs::File::create(&temp_path)?;
        f.write_all(content)?;
        f.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    // fsync the directory so the rename itself is durable
    if let Ok(dir) = fs::File::open(&parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

pub fn save_artifact(path: &Path, artifact: &ModelArtifact) -> Result<()> {
    artifact.validate()?;
    let bytes = serde_json::to_vec_pretty(artifact)?;
    atomic_write(path, &bytes)?;
    info!(
        target: "store",
        path = %path.display(),
        features = artifact.schema.len(),
        training_size = artifact.metadata.training_size,
        "model artifact written"
    );
    Ok(())
}

/// Read and validate an artifact. Every failure is a `ModelLoad` error.
pub fn load_artifact(path: &Path) -> Result<ModelArtifact> {
    let bytes = fs::read(path).map_err(|e| {
        CredibilityError::model_load(format!("cannot read {}: {e}", path.display()))
    })?;
    let artifact: ModelArtifact = serde_json::from_slice(&bytes).map_err(|e| {
        CredibilityError::model_load(format!("cannot parse {}: {e}", path.display()))
    })?;
    artifact.validate()?;
    Ok(artifact)
}

/// Shared, swappable reference to the current artifact.
///
/// Requests take an `Arc` snapshot and pass it explicitly to the engine; a
/// reload swaps the pointer without touching in-flight snapshots.
#[derive(Clone, Debug)]
pub struct ModelHandle {
    path: PathBuf,
    inner: Arc<RwLock<Option<Arc<ModelArtifact>>>>,
}

impl ModelHandle {
    /// Handle with nothing loaded yet.
    pub fn empty<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Handle that tries an initial load; absence or corruption is not fatal.
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let handle = Self::empty(path);
        handle.reload();
        handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Option<Arc<ModelArtifact>> {
        self.inner.read().ok().and_then(|g| g.clone())
    }

    /// Reload from disk. On failure the handle is cleared so scoring falls back.
    pub fn reload(&self) -> Option<Arc<ModelArtifact>> {
        let loaded = match load_artifact(&self.path) {
            Ok(a) => {
                info!(
                    target: "store",
                    path = %self.path.display(),
                    training_size = a.metadata.training_size,
                    "model artifact loaded"
                );
                Some(Arc::new(a))
            }
            Err(e) => {
                warn!(target: "store", path = %self.path.display(), error = %e, "no usable model artifact; scoring will use the fallback");
                None
            }
        };
        metrics::counter!("credibility_model_reloads_total").increment(1);
        if let Ok(mut guard) = self.inner.write() {
            *guard = loaded.clone();
        }
        loaded
    }
}

/// Poll the artifact's mtime and reload on change.
pub fn start_reload_thread(handle: ModelHandle, poll: Duration) {
    thread::spawn(move || {
        let mut last_mtime: Option<SystemTime> = fs::metadata(handle.path())
            .and_then(|m| m.modified())
            .ok();
        loop {
            thread::sleep(poll);
            match fs::metadata(handle.path()).and_then(|m| m.modified()) {
                Ok(mtime) => {
                    if last_mtime != Some(mtime) {
                        handle.reload();
                        last_mtime = Some(mtime);
                    }
                }
                Err(_) => {
                    // artifact removed; keep serving whatever was loaded
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::toy_artifact;

    #[test]
    fn save_then_load_returns_same_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let a = toy_artifact();
        save_artifact(&path, &a).unwrap();
        let b = load_artifact(&path).unwrap();
        assert_eq!(a.coefficients, b.coefficients);
        assert_eq!(a.schema, b.schema);

        // no temp files left behind
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_and_corrupt_artifacts_are_model_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            load_artifact(&missing),
            Err(CredibilityError::ModelLoad(_))
        ));

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, b"{ not json").unwrap();
        assert!(matches!(
            load_artifact(&corrupt),
            Err(CredibilityError::ModelLoad(_))
        ));
    }

    #[test]
    fn handle_clears_on_failed_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let handle = ModelHandle::open(&path);
        assert!(handle.snapshot().is_none());

        save_artifact(&path, &toy_artifact()).unwrap();
        assert!(handle.reload().is_some());
        let held = handle.snapshot().unwrap();

        fs::write(&path, b"garbage").unwrap();
        assert!(handle.reload().is_none());
        assert!(handle.snapshot().is_none());
        // earlier snapshots stay valid
        assert_eq!(held.metadata.training_size, 12);
    }
}
