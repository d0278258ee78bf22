//! `viewpack build`: compile one bundle in a worker and write it out.

use crate::cli::BuildArgs;
use crate::commands::utils;
use crate::error::{Result, ResultExt};
use crate::ui;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use viewpack::{BuildOutput, BuildRegistry};

/// Execute the build command.
///
/// 1. Resolve the project, its configuration and the view manifest
/// 2. Build through a registry backed by worker processes
/// 3. Write the bundle (and the visualization, if asked for)
pub async fn execute(args: BuildArgs) -> Result<()> {
    let started = Instant::now();
    let project = utils::prepare(&args.bundle)?;

    ui::info(&format!(
        "Building {} ({})",
        project.entry.display(),
        project.opts.flags.feature_summary()
    ));

    let registry =
        BuildRegistry::from_config(&project.config, utils::worker_spawner(&project.root)?);
    let built = match project.manifest {
        Some(manifest) => {
            registry
                .get_or_build_with_manifest(&project.entry, &project.opts, manifest)
                .await
        }
        None => registry.get_or_build(&project.entry, &project.opts).await,
    };
    registry.shutdown().await;
    let output = built?;

    match &args.out {
        Some(path) => write_file(path, &output.bundle).await?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(output.bundle.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    if let Some(path) = &args.disc_out {
        write_disc(path, &output).await?;
    }

    ui::success(&format!(
        "Built {} ({}) in {}",
        project.entry.display(),
        ui::format_size(output.bundle.len() as u64),
        ui::format_duration(started.elapsed())
    ));
    Ok(())
}

async fn write_disc(path: &Path, output: &BuildOutput) -> Result<()> {
    match &output.disc {
        Some(html) => write_file(path, html).await,
        None => {
            ui::warning(&format!(
                "No visualization produced for {}; enable it with --opts +use_disc",
                output.result.entry_file.display()
            ));
            Ok(())
        }
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.with_path(parent)?;
    }
    tokio::fs::write(path, contents).await.with_path(path)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}
