//! Modification-time snapshots for cache invalidation.
//!
//! A snapshot is one entry per watched path, in the configured order. The
//! comparison is whole-file mtime, not content: touching a file counts as a
//! change, and an edit that preserves the mtime does not.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Modification time in epoch milliseconds; `None` when the path could not
/// be stat'ed.
pub type Mtime = Option<i64>;

/// Result of comparing the current mtimes with a previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staleness {
    /// Fresh snapshot, aligned with the watched paths
    pub current_mtimes: Vec<Mtime>,
    /// Whether a rebuild is needed
    pub changed: bool,
}

/// Stat every path and compare against `previous`.
///
/// `changed` is true when there is no previous snapshot, when the list
/// lengths differ, or when any positional mtime differs.
pub async fn compute_staleness(paths: &[PathBuf], previous: Option<&[Mtime]>) -> Staleness {
    let current_mtimes = snapshot(paths).await;
    let changed = match previous {
        None => true,
        Some(previous) => has_changed(previous, &current_mtimes),
    };
    Staleness {
        current_mtimes,
        changed,
    }
}

/// Stat each path in order.
pub async fn snapshot(paths: &[PathBuf]) -> Vec<Mtime> {
    let mut mtimes = Vec::with_capacity(paths.len());
    for path in paths {
        mtimes.push(mtime_of(path).await);
    }
    mtimes
}

/// Positional comparison of two snapshots.
pub fn has_changed(previous: &[Mtime], current: &[Mtime]) -> bool {
    previous.len() != current.len() || previous.iter().zip(current).any(|(a, b)| a != b)
}

async fn mtime_of(path: &Path) -> Mtime {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::debug!("Cannot stat watched file {}: {}", path.display(), e);
            return None;
        }
    };
    let modified = metadata.modified().ok()?;
    let millis = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    };
    Some(millis)
}
