//! Error handling for the viewpack CLI.
//!
//! [`CliError`] is what every command returns. Pipeline failures arrive as
//! [`viewpack::BuildError`] and convert automatically; [`ConfigError`] covers
//! problems with the project setup that the user has to fix by hand.

mod report;

pub use report::{build_error_to_miette, cli_error_to_miette};

use std::path::PathBuf;
use thiserror::Error;
use viewpack::BuildError;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Project configuration problems
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failures from the build pipeline
    #[error("Build error: {0}")]
    Build(BuildError),

    /// Invalid command-line arguments or options
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

impl From<BuildError> for CliError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Config(message) => CliError::Config(ConfigError::Invalid(message)),
            other => CliError::Build(other),
        }
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `viewpack.toml` / `viewpack.json` failed to parse or validate
    #[error("{0}\n\nHint: Check viewpack.toml, viewpack.json and VIEWPACK_* environment variables")]
    Invalid(String),

    /// The project root does not exist or is not a directory
    #[error("Project root is not a directory: {}\n\nHint: Pass an existing directory with --root", .0.display())]
    RootNotFound(PathBuf),

    /// The views directory does not exist
    #[error("Views directory not found: {}\n\nHint: --views is resolved relative to --root", .0.display())]
    ViewsNotFound(PathBuf),
}

/// Result type alias using `CliError` as the default error type.
pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    ///
    /// ```rust,no_run
    /// # use std::path::Path;
    /// # use viewpack_cli::error::{Result, ResultExt};
    /// # fn run() -> Result<()> {
    /// let path = Path::new("views/index.js");
    /// std::fs::read_to_string(path).with_path(path)?;
    /// # Ok(())
    /// # }
    /// ```
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Append a hint to the error message.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error message with `msg`.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}
