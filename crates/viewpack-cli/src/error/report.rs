//! Miette rendering for CLI errors.

use crate::error::CliError;
use miette::Report;
use viewpack::{BuildError, IpcError};

/// Convert a [`CliError`] into a miette report.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(e) => build_error_to_miette(e),
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        _ => miette::miette!("{}", err),
    }
}

/// Convert a pipeline [`BuildError`] into a miette report with a hint.
pub fn build_error_to_miette(err: BuildError) -> Report {
    match err {
        BuildError::Bundler { entry, diagnostic } => miette::miette!(
            "Bundler failed for {}\n\n{}\n\nHint: Fix the error above; the next request retries the build",
            entry.display(),
            diagnostic.trim_end()
        ),
        BuildError::Timeout { entry, after } => miette::miette!(
            "Build of {} timed out after {:?}\n\nHint: Raise job_timeout_secs in viewpack.toml, or set it to 0 to disable the deadline",
            entry.display(),
            after
        ),
        BuildError::WorkerFatal { attempts } => miette::miette!(
            "Build worker died {} times in a row\n\nHint: Run with --verbose to see the worker's output",
            attempts
        ),
        BuildError::Ipc(IpcError::Spawn(reason)) => miette::miette!(
            "Could not start a build worker: {}\n\nHint: Check that the viewpack binary is still in place",
            reason
        ),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_bundler_report_includes_diagnostic() {
        let report = build_error_to_miette(BuildError::Bundler {
            entry: PathBuf::from("/app/index.js"),
            diagnostic: "Error: Cannot find module './nope'\n".to_string(),
        });
        let text = report.to_string();
        assert!(text.contains("/app/index.js"));
        assert!(text.contains("Cannot find module './nope'"));
        assert!(text.contains("Hint:"));
    }

    #[test]
    fn test_other_errors_use_display() {
        let report = cli_error_to_miette(CliError::Server("bind failed".to_string()));
        assert_eq!(report.to_string(), "Server error: bind failed");
    }
}
