//! Subscriber setup for processes that run viewpack workers.
//!
//! Only available with the `logging` feature; as a library viewpack just
//! emits `tracing` events.
//!
//! A worker's stdout carries protocol frames and its stderr is interleaved
//! with the parent's own log output, so events are written to stderr without
//! ANSI codes or timestamps. `RUST_LOG`, inherited from the parent, takes
//! precedence over the level given here.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// How much a worker process logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Silent,
    /// Failed builds and worker faults
    Error,
    /// Also ignored messages and cleanup failures
    Warn,
    #[default]
    Info,
    /// Every pipeline step
    Debug,
}

impl LogLevel {
    /// Map the CLI's `--verbose` / `--quiet` switches; verbose wins.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => LogLevel::Debug,
            (false, true) => LogLevel::Error,
            (false, false) => LogLevel::Info,
        }
    }

    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Silent => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" | "off" => Ok(LogLevel::Silent),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

/// Filter for a worker process: `RUST_LOG` if set, otherwise `level`.
pub fn worker_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.filter().into())
        .from_env_lossy()
}

/// Install the worker subscriber.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the existing one keeps receiving events.
pub fn init_logging(level: LogLevel) -> bool {
    tracing_subscriber::registry()
        .with(worker_filter(level))
        .with(
            fmt::layer()
                .compact()
                .with_ansi(false)
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_pick_level() {
        assert_eq!(LogLevel::from_flags(false, false), LogLevel::Info);
        assert_eq!(LogLevel::from_flags(false, true), LogLevel::Error);
        assert_eq!(LogLevel::from_flags(true, true), LogLevel::Debug);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("OFF".parse::<LogLevel>(), Ok(LogLevel::Silent));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_second_init_reports_existing_subscriber() {
        init_logging(LogLevel::Silent);
        assert!(!init_logging(LogLevel::Debug));
    }
}
