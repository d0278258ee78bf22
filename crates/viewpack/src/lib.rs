#![cfg_attr(docsrs, feature(doc_cfg))]

//! # viewpack
//!
//! Cached, coalesced browser bundles for server-side views.
//!
//! A [`BuildRegistry`] hands out bundles per entry file. The first request
//! (or the first after a watched file changes) dispatches a build job to a
//! worker process; everyone asking in the meantime shares that build. The
//! worker runs the bundling engine, writes the artifacts to a temp
//! directory and replies with their paths and SHA-256 checksums; the
//! registry reads them back, verifies them, and removes the directory.
//!
//! ```no_run
//! use std::sync::Arc;
//! use viewpack::{BuildOptions, BuildRegistry, ProcessSpawner, ViewpackConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> viewpack::Result<()> {
//! let config = ViewpackConfig::load(std::path::Path::new("."))?;
//! let spawner = Arc::new(ProcessSpawner::current_exe()?);
//! let registry = BuildRegistry::from_config(&config, spawner);
//!
//! let opts = BuildOptions::new(config.build_flags()).with_entries(["views/index.js"]);
//! let output = registry.get_or_build("views/index.js", &opts).await?;
//! println!("{} bytes ({})", output.bundle.len(), output.result.feature_summary);
//! # Ok(()) }
//! ```

pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod materialize;
pub mod package;
pub mod registry;
pub mod staleness;
pub mod types;
pub mod views;
pub mod worker;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

pub use config::{BuildFlags, ViewpackConfig};
pub use engine::{BundleEngine, BundleRequest, CommandEngine, Transform};
pub use error::{BuildError, ErrorDescriptor, ErrorKind, IpcError, Result};
pub use materialize::{Manifest, materialize};
pub use package::{checksum, package, read_back};
pub use registry::{BuildCacheEntry, BuildRegistry, BuildReporting};
pub use staleness::{Staleness, compute_staleness};
pub use types::{BuildJob, BuildOptions, BuildOutput, BuildResult};
pub use views::{Target, ViewLoader, loader_for};
pub use worker::{InProcessSpawner, PoolConfig, ProcessSpawner, WorkerPool, WorkerSpawner};
