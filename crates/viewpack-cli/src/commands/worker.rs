//! `viewpack worker`: the child-process end of the worker pool.
//!
//! Reads one JSON job per line on stdin and answers each on stdout. Logs go
//! to stderr, which the parent inherits.

use crate::cli::WorkerArgs;
use crate::commands::utils;
use crate::error::Result;
use tracing::Instrument;
use viewpack::CommandEngine;
use viewpack::worker::serve_worker;

/// Execute the worker command. Returns when stdin closes.
pub async fn execute(args: WorkerArgs) -> Result<()> {
    let root = utils::resolve_root(&args.root)?;
    let config = utils::load_config(&root, None)?;
    let engine = CommandEngine::new(config.engine.clone());

    serve_worker(
        tokio::io::stdin(),
        tokio::io::stdout(),
        &engine,
        &config.server_modules,
    )
    .instrument(tracing::info_span!("worker", pid = std::process::id()))
    .await?;
    Ok(())
}
