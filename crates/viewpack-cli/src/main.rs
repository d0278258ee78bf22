//! viewpack CLI - cached browser bundles for server-side views.
//!
//! Parses the command line, sets up logging and colors, and dispatches to the
//! selected command.

use clap::Parser;
use miette::Result;
use viewpack::logging::LogLevel;
use viewpack_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    if matches!(args.command, cli::Command::Worker(_)) {
        viewpack::logging::init_logging(LogLevel::from_flags(args.verbose, args.quiet));
    } else {
        logger::init_logger(args.verbose, args.quiet, args.no_color);
    }
    ui::init_colors(args.no_color);

    let result = match args.command {
        cli::Command::Build(build_args) => commands::build_execute(build_args).await,
        cli::Command::Serve(serve_args) => commands::serve_execute(serve_args).await,
        cli::Command::Worker(worker_args) => commands::worker_execute(worker_args).await,
    };

    result.map_err(error::cli_error_to_miette)
}
