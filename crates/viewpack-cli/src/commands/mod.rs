//! Command implementations.
//!
//! - [`build`] - one-shot build written to a file or stdout
//! - [`serve`] - HTTP server backed by the build registry
//! - [`worker`] - the process end of the worker pool
//!
//! Each command provides an `execute` function taking its parsed arguments.

pub mod build;
pub mod serve;
pub(crate) mod utils;
pub mod worker;

pub use build::execute as build_execute;
pub use serve::execute as serve_execute;
pub use worker::execute as worker_execute;
