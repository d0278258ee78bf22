//! `viewpack serve`: serve a bundle over HTTP.

use crate::cli::ServeArgs;
use crate::commands::utils;
use crate::error::{CliError, Result};
use crate::ui;
use tokio::net::TcpListener;
use viewpack::BuildRegistry;
use viewpack::http::{BundleRoute, router};

/// Execute the serve command.
///
/// Runs until Ctrl+C, then stops the worker pool.
pub async fn execute(args: ServeArgs) -> Result<()> {
    let project = utils::prepare(&args.bundle)?;
    let registry =
        BuildRegistry::from_config(&project.config, utils::worker_spawner(&project.root)?);

    let route = BundleRoute {
        name: args.name.clone(),
        entry_file: project.entry.clone(),
        opts: project.opts.clone(),
        manifest: project.manifest.clone(),
    };
    let app = router(registry.clone(), vec![route]);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| CliError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

    let name = args.name.trim_matches('/');
    ui::success(&format!("Serving http://{}/{}.js", addr, name));
    if project.opts.flags.use_disc {
        ui::info(&format!("Bundle visualization at http://{}/{}.html", addr, name));
    }
    ui::info("Press Ctrl+C to stop");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| CliError::Server(format!("Server error: {}", e)));

    ui::info("Shutting down build workers...");
    registry.shutdown().await;
    served?;
    ui::success("Server stopped");
    Ok(())
}
