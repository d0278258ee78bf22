//! Out-of-process compilation.
//!
//! The serving side owns a [`WorkerPool`]; each worker runs [`serve_worker`]
//! and talks JSON lines over a pair of byte streams (see [`protocol`]).

pub mod protocol;

mod pool;
mod serve;
mod spawn;

pub use pool::{PoolConfig, WorkerPool};
pub use serve::{run_job, serve_worker};
pub use spawn::{
    InProcessSpawner, ProcessSpawner, WorkerChannel, WorkerProcess, WorkerReader, WorkerSpawner,
    WorkerWriter,
};
