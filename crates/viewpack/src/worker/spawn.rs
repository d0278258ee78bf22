//! Starting workers.
//!
//! A worker is anything that speaks the JSON-lines protocol over a pair of
//! byte streams: a child process on its stdio, or a task in this process
//! over an in-memory pipe.

use super::serve::serve_worker;
use crate::engine::BundleEngine;
use crate::error::{IpcError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Capacity of the in-memory pipe used by in-process workers.
const DUPLEX_CAPACITY: usize = 64 * 1024;

pub type WorkerReader = Box<dyn AsyncRead + Send + Unpin>;
pub type WorkerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// What keeps a worker running, so it can be stopped.
#[derive(Debug)]
pub enum WorkerProcess {
    Child(Child),
    Task(JoinHandle<()>),
    /// Nothing to stop beyond closing the streams
    Detached,
}

impl WorkerProcess {
    /// Stop the worker without waiting for it.
    pub fn terminate(&mut self) {
        match self {
            WorkerProcess::Child(child) => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Worker process already gone: {}", e);
                }
            }
            WorkerProcess::Task(handle) => handle.abort(),
            WorkerProcess::Detached => {}
        }
    }
}

/// Both ends of a freshly started worker.
pub struct WorkerChannel {
    /// Responses from the worker
    pub reader: WorkerReader,
    /// Jobs to the worker
    pub writer: WorkerWriter,
    pub process: WorkerProcess,
}

/// Starts workers on demand.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self) -> Result<WorkerChannel>;
}

/// Runs a worker as a child process talking over stdin/stdout.
///
/// The child's stderr is inherited so its logs reach the parent's terminal.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
        }
    }

    /// Re-run the current executable with the `worker` subcommand.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| IpcError::Spawn(format!("cannot locate current executable: {e}")))?;
        Ok(Self::new(program, vec!["worker".to_string()]))
    }

    /// Working directory for spawned workers.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self) -> Result<WorkerChannel> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            IpcError::Spawn(format!("{}: {}", self.program.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| IpcError::Spawn("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IpcError::Spawn("worker stdout not captured".to_string()))?;

        tracing::debug!(
            "Spawned worker {} (pid {:?})",
            self.program.display(),
            child.id()
        );

        Ok(WorkerChannel {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            process: WorkerProcess::Child(child),
        })
    }
}

/// Runs the worker loop as a task in this process.
pub struct InProcessSpawner {
    engine: Arc<dyn BundleEngine>,
    server_modules: Arc<[String]>,
}

impl InProcessSpawner {
    pub fn new(engine: Arc<dyn BundleEngine>, server_modules: Vec<String>) -> Self {
        Self {
            engine,
            server_modules: server_modules.into(),
        }
    }
}

#[async_trait]
impl WorkerSpawner for InProcessSpawner {
    async fn spawn(&self) -> Result<WorkerChannel> {
        let (pool_side, worker_side) = tokio::io::duplex(DUPLEX_CAPACITY);
        let (worker_reader, worker_writer) = tokio::io::split(worker_side);
        let (reader, writer) = tokio::io::split(pool_side);

        let engine = Arc::clone(&self.engine);
        let server_modules = Arc::clone(&self.server_modules);
        let task = tokio::spawn(async move {
            if let Err(e) =
                serve_worker(worker_reader, worker_writer, engine.as_ref(), &server_modules).await
            {
                tracing::error!("In-process worker stopped: {}", e);
            }
        });

        Ok(WorkerChannel {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: WorkerProcess::Task(task),
        })
    }
}
