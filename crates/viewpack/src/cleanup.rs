//! Scoped ownership of temporary build artifacts.
//!
//! Every temp directory the pipeline allocates is owned by exactly one
//! [`TempArtifact`]. Cleanup runs on every exit path: explicitly through
//! [`TempArtifact::cleanup`] or [`with_cleanup`], and implicitly on drop.
//! Cleanup failures are logged and never replace the operation's outcome.

use std::future::Future;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory holding one generated file.
#[derive(Debug)]
pub struct TempArtifact {
    dir: Option<TempDir>,
    directory: PathBuf,
    file: PathBuf,
}

impl TempArtifact {
    /// Take ownership of `dir`, recording `file` as its payload.
    pub fn new(dir: TempDir, file: PathBuf) -> Self {
        Self {
            directory: dir.path().to_path_buf(),
            dir: Some(dir),
            file,
        }
    }

    /// Directory that will be removed on cleanup.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Generated file inside [`TempArtifact::directory`].
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Whether cleanup has already run.
    pub fn is_cleaned(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the directory and its contents. Safe to call more than once.
    pub fn cleanup(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if let Err(e) = dir.close() {
            tracing::warn!(
                "Failed to remove temp directory {}: {}",
                self.directory.display(),
                e
            );
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Run `op` with the artifact's file, then clean the artifact up whatever
/// the outcome.
pub async fn with_cleanup<T, F, Fut>(mut artifact: TempArtifact, op: F) -> T
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = T>,
{
    let outcome = op(artifact.file().to_path_buf()).await;
    artifact.cleanup();
    outcome
}

/// Remove a directory tree if it exists, logging instead of failing.
pub async fn remove_dir_best_effort(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
