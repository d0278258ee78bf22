//! Packaging of finished bundles.
//!
//! The worker writes its artifacts into a temp directory and hands back only
//! a descriptor: paths plus SHA-256 checksums. The serving side reads the
//! files back, verifies them, and removes the directory.

use crate::cleanup::remove_dir_best_effort;
use crate::config::BuildFlags;
use crate::error::{BuildError, IoResultExt, IpcError, Result};
use crate::types::{ArtifactPaths, BuildOutput, BuildResult, Checksums};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const BUNDLE_FILE: &str = "bundle.js";
pub const DISC_FILE: &str = "disc.html";

/// Lowercase hex SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write the bundle (and visualization, if any) to a fresh temp directory.
///
/// On success the directory outlives this call; the returned descriptor owns
/// it. On failure nothing is left behind.
pub async fn package(
    entry_file: &Path,
    flags: BuildFlags,
    bundle: &str,
    disc: Option<&str>,
) -> Result<BuildResult> {
    let dir = tempfile::Builder::new()
        .prefix("viewpack-build-")
        .tempdir()
        .io_context(|| "creating build temp directory".to_string())?;

    let bundle_file = dir.path().join(BUNDLE_FILE);
    tokio::fs::write(&bundle_file, bundle)
        .await
        .io_context(|| format!("writing {}", bundle_file.display()))?;

    let disc_file = match disc {
        Some(html) => {
            let path = dir.path().join(DISC_FILE);
            tokio::fs::write(&path, html)
                .await
                .io_context(|| format!("writing {}", path.display()))?;
            Some(path)
        }
        None => None,
    };

    let checksums = Checksums {
        bundle: checksum(bundle.as_bytes()),
        disc: disc.map(|html| checksum(html.as_bytes())),
    };

    // Every early return above drops `dir`, which removes it.
    let temp_dir = dir.keep();
    tracing::debug!("Packaged {} into {}", entry_file.display(), temp_dir.display());

    Ok(BuildResult {
        entry_file: entry_file.to_path_buf(),
        applied_options: flags,
        feature_summary: flags.feature_summary(),
        checksums,
        artifact_paths: ArtifactPaths {
            bundle_file,
            disc_file,
            temp_dir,
        },
    })
}

/// Load a packaged build into memory and release its temp directory.
///
/// The directory is removed whether or not reading and verification succeed.
pub async fn read_back(result: BuildResult) -> Result<BuildOutput> {
    let temp_dir = result.artifact_paths.temp_dir.clone();
    let loaded = load_artifacts(&result).await;
    remove_dir_best_effort(&temp_dir).await;

    let (bundle, disc) = loaded?;
    Ok(BuildOutput {
        result,
        bundle,
        disc,
    })
}

async fn load_artifacts(result: &BuildResult) -> Result<(String, Option<String>)> {
    let paths = &result.artifact_paths;
    let bundle = read_verified(&paths.bundle_file, &result.checksums.bundle).await?;

    let disc = match (&paths.disc_file, &result.checksums.disc) {
        (Some(file), Some(expected)) => Some(read_verified(file, expected).await?),
        (None, None) => None,
        _ => {
            return Err(IpcError::Malformed(
                "visualization file and checksum must be reported together".to_string(),
            )
            .into());
        }
    };
    Ok((bundle, disc))
}

async fn read_verified(file: &PathBuf, expected: &str) -> Result<String> {
    let bytes = tokio::fs::read(file)
        .await
        .io_context(|| format!("reading {}", file.display()))?;
    let actual = checksum(&bytes);
    if actual != expected {
        return Err(BuildError::Ipc(IpcError::ChecksumMismatch {
            file: file.clone(),
            expected: expected.to_string(),
            actual,
        }));
    }
    String::from_utf8(bytes).map_err(|e| {
        BuildError::Ipc(IpcError::Malformed(format!(
            "{} is not valid UTF-8: {}",
            file.display(),
            e
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(checksum(b"abc"), checksum(b"abc"));
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
    }

    #[tokio::test]
    async fn test_package_without_disc() {
        let flags = BuildFlags {
            is_production_build: true,
            minimize_bundle: true,
            ..BuildFlags::default()
        };
        let result = package(Path::new("/a.js"), flags, "bundle();", None)
            .await
            .unwrap();

        assert_eq!(result.feature_summary, "mode=production, minimize=true");
        assert!(result.checksums.disc.is_none());
        assert!(result.artifact_paths.disc_file.is_none());
        assert!(result.artifact_paths.bundle_file.exists());

        let temp_dir = result.artifact_paths.temp_dir.clone();
        let output = read_back(result).await.unwrap();
        assert_eq!(output.bundle, "bundle();");
        assert!(output.disc.is_none());
        assert!(!temp_dir.exists());
    }

    #[tokio::test]
    async fn test_package_with_disc() {
        let flags = BuildFlags {
            use_disc: true,
            ..BuildFlags::default()
        };
        let result = package(Path::new("/a.js"), flags, "b", Some("<html></html>"))
            .await
            .unwrap();
        assert_eq!(
            result.checksums.disc.as_deref(),
            Some(checksum(b"<html></html>").as_str())
        );

        let output = read_back(result).await.unwrap();
        assert_eq!(output.disc.as_deref(), Some("<html></html>"));
    }

    #[tokio::test]
    async fn test_same_input_same_checksums() {
        let a = package(Path::new("/a.js"), BuildFlags::default(), "x", None)
            .await
            .unwrap();
        let b = package(Path::new("/a.js"), BuildFlags::default(), "x", None)
            .await
            .unwrap();
        assert_eq!(a.checksums, b.checksums);
        assert_ne!(a.artifact_paths.temp_dir, b.artifact_paths.temp_dir);
        read_back(a).await.unwrap();
        read_back(b).await.unwrap();
    }

    #[tokio::test]
    async fn test_tampered_bundle_is_rejected_and_removed() {
        let result = package(Path::new("/a.js"), BuildFlags::default(), "original", None)
            .await
            .unwrap();
        std::fs::write(&result.artifact_paths.bundle_file, "tampered").unwrap();
        let temp_dir = result.artifact_paths.temp_dir.clone();

        let err = read_back(result).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Ipc(IpcError::ChecksumMismatch { .. })
        ));
        assert!(!temp_dir.exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_io_error() {
        let result = package(Path::new("/a.js"), BuildFlags::default(), "x", None)
            .await
            .unwrap();
        std::fs::remove_dir_all(&result.artifact_paths.temp_dir).unwrap();
        let err = read_back(result).await.unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }
}
