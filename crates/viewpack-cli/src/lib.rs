//! viewpack CLI.
//!
//! Command-line front end for the [`viewpack`] build pipeline:
//!
//! - [`commands`] - `build`, `serve` and the hidden `worker` command that
//!   the pipeline spawns for each pool slot
//! - [`error`] - CLI error types and their miette rendering
//! - [`logger`] - tracing setup; everything goes to stderr
//! - [`ui`] - status messages and size/duration formatting
//!
//! # Example
//!
//! ```rust,no_run
//! use viewpack_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, ConfigError, Result, ResultExt};
