//! Data shared by the serving side and the worker.

use crate::config::BuildFlags;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Options that travel with every job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Files whose modification times decide cache freshness, in order
    #[serde(default)]
    pub entries: Vec<PathBuf>,

    /// Materialized manifest module, exposed inside the bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_file: Option<PathBuf>,

    /// Extra server-only modules to keep out of the bundle
    #[serde(default)]
    pub node_files: Vec<PathBuf>,

    #[serde(default)]
    pub flags: BuildFlags,
}

impl BuildOptions {
    pub fn new(flags: BuildFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// Watch these files for changes.
    pub fn with_entries<I, P>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.entries = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Exclude these server-only modules.
    pub fn with_node_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.node_files = files.into_iter().map(Into::into).collect();
        self
    }
}

/// One unit of work sent to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    /// Correlation id, unique among outstanding jobs
    pub id: String,
    pub entry_file: PathBuf,
    pub opts: BuildOptions,
}

impl BuildJob {
    /// New job with a fresh random id.
    pub fn new(entry_file: PathBuf, opts: BuildOptions) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entry_file,
            opts,
        }
    }
}

/// Hex SHA-256 digests of the produced artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub bundle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc: Option<String>,
}

/// Where the worker left its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub bundle_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disc_file: Option<PathBuf>,
    /// Directory holding both files; removed by whoever reads them back
    pub temp_dir: PathBuf,
}

/// Descriptor of a finished build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub entry_file: PathBuf,
    pub applied_options: BuildFlags,
    pub feature_summary: String,
    pub checksums: Checksums,
    pub artifact_paths: ArtifactPaths,
}

/// A build result with its artifacts loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub result: BuildResult,
    pub bundle: String,
    /// Present iff the build ran with the visualization enabled
    pub disc: Option<String>,
}
