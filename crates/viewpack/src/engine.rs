//! Bundling engine invocation.
//!
//! The worker turns each job into a [`BundleRequest`]: the entry module,
//! the manifest module exposed under a well-known name, an exclusion list of
//! server-only modules, and an ordered transform pipeline. A
//! [`BundleEngine`] turns the request into a finished bundle.

use crate::config::{BuildFlags, EngineConfig, MANIFEST_MODULE, PIPELINE_SELF_MODULES};
use crate::error::{BuildError, Result};
use crate::types::BuildOptions;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A module added to the graph under a fixed name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedModule {
    pub file: PathBuf,
    pub expose: String,
}

/// Global transform stage, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Transform {
    /// Precompile server-side templates so they render without a compiler
    TemplatePrecompile,
    /// Inline configured environment variables as constants
    EnvSubstitution,
    /// Minify the output
    Minify,
}

impl Transform {
    /// Fixed pipeline for the given flags; minification only in
    /// minimizing builds.
    pub fn pipeline(flags: &BuildFlags) -> Vec<Transform> {
        let mut transforms = vec![Transform::TemplatePrecompile, Transform::EnvSubstitution];
        if flags.minimize_bundle {
            transforms.push(Transform::Minify);
        }
        transforms
    }

    /// Transform module name as configured for the external engine.
    pub fn module_name<'a>(&self, config: &'a EngineConfig) -> &'a str {
        match self {
            Transform::TemplatePrecompile => &config.transforms.template,
            Transform::EnvSubstitution => &config.transforms.env,
            Transform::Minify => &config.transforms.minify,
        }
    }
}

/// Everything an engine needs to produce one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    pub entry_file: PathBuf,
    pub extra_entry: Option<ExposedModule>,
    pub exclude: Vec<String>,
    pub transforms: Vec<Transform>,
    /// Environment the transforms see (`NODE_ENV` at least)
    pub env: Vec<(String, String)>,
    /// Inline source maps
    pub debug: bool,
    /// Keep full module paths (needed by the visualization)
    pub full_paths: bool,
}

impl BundleRequest {
    /// Build the request for one job.
    ///
    /// The exclusion list is the configured server-only modules, the
    /// pipeline's own shims, and every `node_files` entry of the job.
    pub fn for_job(entry_file: &Path, opts: &BuildOptions, server_modules: &[String]) -> Self {
        let mut exclude: Vec<String> = Vec::new();
        let mut push = |module: String| {
            if !exclude.contains(&module) {
                exclude.push(module);
            }
        };
        for module in server_modules {
            push(module.clone());
        }
        for module in PIPELINE_SELF_MODULES {
            push((*module).to_string());
        }
        for file in &opts.node_files {
            push(file.to_string_lossy().into_owned());
        }

        Self {
            entry_file: entry_file.to_path_buf(),
            extra_entry: opts.manifest_file.as_ref().map(|file| ExposedModule {
                file: file.clone(),
                expose: MANIFEST_MODULE.to_string(),
            }),
            exclude,
            transforms: Transform::pipeline(&opts.flags),
            env: vec![("NODE_ENV".to_string(), opts.flags.node_env().to_string())],
            debug: opts.flags.enable_source_maps,
            full_paths: opts.flags.use_disc,
        }
    }
}

/// Something that can compile a module graph into a bundle.
#[async_trait]
pub trait BundleEngine: Send + Sync {
    /// Produce the finished bundle body.
    async fn bundle(&self, request: &BundleRequest) -> Result<String>;

    /// Produce an HTML report describing the bundle's composition.
    async fn visualize(&self, bundle: &str) -> Result<String>;
}

/// Runs a browserify-compatible command line.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    config: EngineConfig,
}

impl CommandEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for a request.
    pub fn build_args(&self, request: &BundleRequest) -> Vec<String> {
        let mut args = self.config.args.clone();

        if let Some(extra) = &request.extra_entry {
            args.push("--require".to_string());
            args.push(format!("{}:{}", extra.file.display(), extra.expose));
        }
        for module in &request.exclude {
            args.push("--ignore".to_string());
            args.push(module.clone());
        }
        for transform in &request.transforms {
            args.push("--global-transform".to_string());
            args.push(transform.module_name(&self.config).to_string());
        }
        if request.debug {
            args.push("--debug".to_string());
        }
        if request.full_paths {
            args.push("--full-paths".to_string());
        }
        args.push(request.entry_file.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl BundleEngine for CommandEngine {
    async fn bundle(&self, request: &BundleRequest) -> Result<String> {
        let args = self.build_args(request);
        tracing::debug!("Running {} {:?}", self.config.program, args);

        let output = Command::new(&self.config.program)
            .args(&args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BuildError::Bundler {
                entry: request.entry_file.clone(),
                diagnostic: format!("failed to run {}: {}", self.config.program, e),
            })?;

        if !output.status.success() {
            return Err(BuildError::Bundler {
                entry: request.entry_file.clone(),
                diagnostic: stderr_text(&output.stderr).unwrap_or_else(|| {
                    format!("{} exited with {}", self.config.program, output.status)
                }),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| BuildError::Bundler {
            entry: request.entry_file.clone(),
            diagnostic: format!("bundle is not valid UTF-8: {e}"),
        })
    }

    async fn visualize(&self, bundle: &str) -> Result<String> {
        let mut child = Command::new(&self.config.disc_program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::io(format!("starting {}", self.config.disc_program), e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BuildError::Internal("visualizer stdin unavailable".to_string()))?;
        let input = bundle.to_string();
        let writer = tokio::spawn(async move {
            let written = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
            written
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BuildError::io(format!("running {}", self.config.disc_program), e))?;
        if let Ok(Err(e)) = writer.await {
            tracing::debug!("Visualizer closed its input early: {}", e);
        }

        if !output.status.success() {
            let program = &self.config.disc_program;
            return Err(BuildError::Internal(match stderr_text(&output.stderr) {
                Some(text) => format!("{program} failed: {text}"),
                None => format!("{program} exited with {}", output.status),
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn stderr_text(stderr: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(stderr).trim().to_string();
    (!text.is_empty()).then_some(text)
}
