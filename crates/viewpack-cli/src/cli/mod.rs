//! Command-line interface definition.
//!
//! - `viewpack build` - build one bundle and write it out
//! - `viewpack serve` - serve bundles over HTTP, rebuilding on change
//! - `viewpack worker` - build worker spoken to over stdin/stdout (internal)

mod commands;

use clap::Parser;

pub use commands::{BuildArgs, BundleArgs, Command, ServeArgs, WorkerArgs};

/// viewpack - cached browser bundles for server-side views
#[derive(Parser, Debug)]
#[command(
    name = "viewpack",
    version,
    about = "Cached browser bundles for server-side views",
    long_about = "viewpack builds browser bundles for view entry files in isolated worker\n\
                  processes, caches them until a watched file changes, and serves them\n\
                  over HTTP."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
