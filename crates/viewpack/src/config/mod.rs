//! Configuration for the build pipeline.
//!
//! Merges settings from defaults, `viewpack.toml` / `viewpack.json`, and the
//! environment. Priority: environment > file > defaults.

mod defaults;
mod flags;
mod loading;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use defaults::*;
pub use flags::{BuildFlags, FlagOverrides};

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewpackConfig {
    /// Value of `NODE_ENV`; `production` selects a production build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_env: Option<String>,

    /// Flag overrides such as `"+production -minimize"`
    pub opts: String,

    /// Number of worker processes
    pub pool_size: usize,

    /// Per-job deadline in seconds; `0` disables the deadline
    pub job_timeout_secs: u64,

    /// Worker restart policy
    pub restart: RestartConfig,

    /// External bundler commands
    pub engine: EngineConfig,

    /// Modules that only make sense on the server and must never be bundled
    pub server_modules: Vec<String>,

    /// Log successful builds at info level
    pub messages: bool,

    /// Log failed builds at error level
    pub errors: bool,
}

/// Back-off settings for respawning dead workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Consecutive failed restarts before the pool gives up
    pub max_restarts: u32,
    /// First back-off delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for the back-off delay in milliseconds
    pub max_backoff_ms: u64,
}

/// External bundler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bundler executable (browserify-compatible command line)
    pub program: String,
    /// Arguments placed before the generated ones
    pub args: Vec<String>,
    /// Visualization executable; reads a bundle on stdin, writes HTML
    pub disc_program: String,
    /// Transform module names, in pipeline order
    pub transforms: TransformNames,
}

/// Module names used for each transform stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformNames {
    pub template: String,
    pub env: String,
    pub minify: String,
}

impl Default for ViewpackConfig {
    fn default() -> Self {
        Self {
            node_env: None,
            opts: String::new(),
            pool_size: default_pool_size(),
            job_timeout_secs: default_job_timeout_secs(),
            restart: RestartConfig::default(),
            engine: EngineConfig::default(),
            server_modules: default_server_modules(),
            messages: true,
            errors: true,
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_bundler_program(),
            args: Vec::new(),
            disc_program: default_disc_program(),
            transforms: TransformNames::default(),
        }
    }
}

impl Default for TransformNames {
    fn default() -> Self {
        Self {
            template: "browserify-ejs".to_string(),
            env: "envify".to_string(),
            minify: "uglifyify".to_string(),
        }
    }
}

impl ViewpackConfig {
    /// Resolve the build flags this configuration selects.
    pub fn build_flags(&self) -> BuildFlags {
        let production = self.node_env.as_deref() == Some("production");
        BuildFlags::resolve(production, &FlagOverrides::parse(&self.opts))
    }

    /// Per-job deadline, if any.
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pool_size == 0 {
            return Err(crate::BuildError::Config(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.engine.program.trim().is_empty() {
            return Err(crate::BuildError::Config(
                "engine.program cannot be empty".to_string(),
            ));
        }
        if self.restart.initial_backoff_ms > self.restart.max_backoff_ms {
            return Err(crate::BuildError::Config(format!(
                "restart.initial_backoff_ms ({}) exceeds restart.max_backoff_ms ({})",
                self.restart.initial_backoff_ms, self.restart.max_backoff_ms
            )));
        }
        Ok(())
    }
}

impl RestartConfig {
    /// Back-off before the given (1-based) restart attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}
