//! Error types for the build pipeline.
//!
//! Every failure surfaces to the original caller's future. A single failed
//! build is shared by every coalesced caller, so [`BuildError`] is `Clone`:
//! sources that are not themselves `Clone` are held behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`BuildError`].
pub type Result<T, E = BuildError> = std::result::Result<T, E>;

/// Top-level error for every pipeline operation.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The bundling engine rejected the module graph (syntax error,
    /// unresolved module). Not retried; the next call re-attempts.
    #[error("Bundler failed for {}: {diagnostic}", .entry.display())]
    Bundler {
        /// Entry file the build was started for
        entry: PathBuf,
        /// Diagnostic output of the underlying tool
        diagnostic: String,
    },

    /// Temp directory/file create, write or read failure.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What the pipeline was doing
        context: String,
        /// Underlying error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Worker channel failure.
    #[error("Worker channel error: {0}")]
    Ipc(#[from] IpcError),

    /// No reply arrived within the job deadline.
    #[error("Build of {} timed out after {:?}", .entry.display(), .after)]
    Timeout {
        /// Entry file of the abandoned job
        entry: PathBuf,
        /// Deadline that expired
        after: Duration,
    },

    /// The worker kept dying and the restart budget is exhausted.
    #[error("Worker failed {attempts} consecutive restarts; giving up")]
    WorkerFatal {
        /// Consecutive failed restarts
        attempts: u32,
    },

    /// Readiness was queried for an entry that was never built.
    #[error("No build was ever started for {}", .0.display())]
    UnknownEntry(PathBuf),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A build task ended without producing an outcome.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A failure reported by the worker that has no more specific variant.
    #[error("Worker reported {kind:?} error: {message}")]
    Remote {
        /// Kind tag from the error descriptor
        kind: ErrorKind,
        /// Message from the error descriptor
        message: String,
    },
}

/// Failures on the worker message channel.
#[derive(Debug, Clone, Error)]
pub enum IpcError {
    /// The worker process could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// The worker closed its output before replying.
    #[error("worker exited before replying")]
    WorkerExited,

    /// The job could not be written to the worker.
    #[error("failed to send job to worker: {0}")]
    SendFailed(String),

    /// A frame could not be encoded or decoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// An artifact read back from the worker does not match its checksum.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", .file.display())]
    ChecksumMismatch {
        /// Artifact file
        file: PathBuf,
        /// Checksum reported by the worker
        expected: String,
        /// Checksum of the bytes actually read
        actual: String,
    },
}

impl BuildError {
    /// Wrap an I/O error with a description of the failed step.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BuildError::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Kind tag used when this error crosses the process boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Bundler { .. } => ErrorKind::Bundler,
            BuildError::Io { .. } => ErrorKind::Io,
            BuildError::Ipc(_) | BuildError::Timeout { .. } | BuildError::WorkerFatal { .. } => {
                ErrorKind::Ipc
            }
            BuildError::Config(_) => ErrorKind::Config,
            BuildError::UnknownEntry(_) | BuildError::Internal(_) => ErrorKind::Internal,
            BuildError::Remote { kind, .. } => *kind,
        }
    }

    /// Whether the bundling engine itself rejected the build.
    pub fn is_bundler_failure(&self) -> bool {
        self.kind() == ErrorKind::Bundler
    }
}

/// Extension for attaching pipeline context to `std::io::Result`.
pub trait IoResultExt<T> {
    /// Convert the I/O error into [`BuildError::Io`] with the given context.
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| BuildError::io(context(), e))
    }
}

/// Category of a failure, as carried in an [`ErrorDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Bundler,
    Io,
    Ipc,
    Config,
    Internal,
}

/// Serializable form of a failure, sent by the worker in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    /// Entry file, when the failure is tied to one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_file: Option<PathBuf>,
}

impl From<&BuildError> for ErrorDescriptor {
    fn from(err: &BuildError) -> Self {
        match err {
            BuildError::Bundler { entry, diagnostic } => ErrorDescriptor {
                kind: ErrorKind::Bundler,
                message: diagnostic.clone(),
                entry_file: Some(entry.clone()),
            },
            other => ErrorDescriptor {
                kind: other.kind(),
                message: other.to_string(),
                entry_file: None,
            },
        }
    }
}

impl ErrorDescriptor {
    /// Rebuild a local error from a descriptor received over the channel.
    ///
    /// `entry` is used when the descriptor does not name one.
    pub fn into_error(self, entry: &std::path::Path) -> BuildError {
        match self.kind {
            ErrorKind::Bundler => BuildError::Bundler {
                entry: self.entry_file.unwrap_or_else(|| entry.to_path_buf()),
                diagnostic: self.message,
            },
            kind => BuildError::Remote {
                kind,
                message: self.message,
            },
        }
    }
}
