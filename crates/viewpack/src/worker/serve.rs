//! The worker side of the channel.

use super::protocol::{BuildResponse, DecodedJob, decode_job, encode_line};
use crate::engine::{BundleEngine, BundleRequest};
use crate::error::{IoResultExt, Result};
use crate::package::package;
use crate::types::{BuildJob, BuildResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Serve build jobs until the input closes.
///
/// Jobs are handled one at a time, in arrival order, and each gets exactly
/// one response line. Lines that cannot be correlated to a job are logged
/// and skipped.
pub async fn serve_worker<R, W>(
    reader: R,
    mut writer: W,
    engine: &dyn BundleEngine,
    server_modules: &[String],
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    tracing::debug!("Worker ready");

    while let Some(line) = lines
        .next_line()
        .await
        .io_context(|| "reading job".to_string())?
    {
        if line.trim().is_empty() {
            continue;
        }

        let response = match decode_job(&line) {
            DecodedJob::Job(job) => {
                let id = job.id.clone();
                match run_job(engine, server_modules, job).await {
                    Ok(result) => BuildResponse::success(&id, &result)?,
                    Err(e) => BuildResponse::failure(&id, &e)?,
                }
            }
            DecodedJob::Invalid { id, error } => {
                tracing::warn!("Rejecting malformed job {}: {}", id, error);
                BuildResponse::failure(&id, &error)?
            }
            DecodedJob::Garbage(error) => {
                tracing::warn!("Ignoring unreadable job line: {}", error);
                continue;
            }
        };

        writer
            .write_all(encode_line(&response)?.as_bytes())
            .await
            .io_context(|| "writing response".to_string())?;
        writer
            .flush()
            .await
            .io_context(|| "flushing response".to_string())?;
    }

    tracing::debug!("Worker input closed, exiting");
    Ok(())
}

/// Bundle, optionally visualize, and package one job.
pub async fn run_job(
    engine: &dyn BundleEngine,
    server_modules: &[String],
    job: BuildJob,
) -> Result<BuildResult> {
    let request = BundleRequest::for_job(&job.entry_file, &job.opts, server_modules);
    tracing::debug!("Bundling {} ({})", job.entry_file.display(), job.id);

    let bundle = engine.bundle(&request).await?;

    let disc = if job.opts.flags.use_disc {
        match engine.visualize(&bundle).await {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::warn!(
                    "Visualization failed for {}, continuing without it: {}",
                    job.entry_file.display(),
                    e
                );
                None
            }
        }
    } else {
        None
    };

    package(&job.entry_file, job.opts.flags, &bundle, disc.as_deref()).await
}
