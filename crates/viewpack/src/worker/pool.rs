//! Pool of long-lived workers with correlated request/response routing.
//!
//! Each worker owns a map of outstanding job ids to `oneshot` senders. A
//! reader task per worker parses response lines and settles the matching
//! listener; when the worker's output closes, every outstanding job is
//! rejected and the worker is marked dead. Dead workers are respawned on
//! next use with exponential back-off until the restart budget runs out.

use super::protocol::{BuildResponse, decode_response, encode_line};
use super::spawn::{WorkerChannel, WorkerProcess, WorkerReader, WorkerSpawner, WorkerWriter};
use crate::cleanup::remove_dir_best_effort;
use crate::config::{RestartConfig, ViewpackConfig};
use crate::error::{BuildError, IpcError, Result};
use crate::types::{BuildJob, BuildOptions, BuildResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Sizing and failure handling for a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub size: usize,
    /// Deadline for a single job; `None` waits forever
    pub job_timeout: Option<Duration>,
    pub restart: RestartConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig::from(&ViewpackConfig::default())
    }
}

impl From<&ViewpackConfig> for PoolConfig {
    fn from(config: &ViewpackConfig) -> Self {
        Self {
            size: config.pool_size.max(1),
            job_timeout: config.job_timeout(),
            restart: config.restart.clone(),
        }
    }
}

struct Listener {
    entry_file: PathBuf,
    tx: oneshot::Sender<Result<BuildResult>>,
}

/// How many abandoned job ids a worker remembers for late-reply cleanup.
const ABANDONED_CAPACITY: usize = 64;

#[derive(Default)]
struct PendingJobs {
    listeners: HashMap<String, Listener>,
    /// Jobs given up on before their reply arrived, oldest first
    abandoned: VecDeque<String>,
    /// Set once the worker's output has closed; no new listeners after that
    closed: bool,
}

impl PendingJobs {
    fn abandon(&mut self, id: &str) {
        if self.listeners.remove(id).is_none() {
            return;
        }
        if self.abandoned.len() == ABANDONED_CAPACITY {
            self.abandoned.pop_front();
        }
        self.abandoned.push_back(id.to_string());
    }

    fn take_abandoned(&mut self, id: &str) -> bool {
        match self.abandoned.iter().position(|abandoned| abandoned == id) {
            Some(index) => {
                self.abandoned.remove(index);
                true
            }
            None => false,
        }
    }
}

/// One running worker.
struct WorkerHandle {
    writer: tokio::sync::Mutex<WorkerWriter>,
    pending: Arc<Mutex<PendingJobs>>,
    process: Mutex<WorkerProcess>,
    reader_task: JoinHandle<()>,
}

impl WorkerHandle {
    fn start(channel: WorkerChannel, failures: Arc<AtomicU32>) -> Self {
        let pending = Arc::new(Mutex::new(PendingJobs::default()));
        let reader_task = tokio::spawn(route_responses(
            channel.reader,
            Arc::clone(&pending),
            failures,
        ));
        Self {
            writer: tokio::sync::Mutex::new(channel.writer),
            pending,
            process: Mutex::new(channel.process),
            reader_task,
        }
    }

    fn is_alive(&self) -> bool {
        !self.pending.lock().closed
    }

    fn load(&self) -> usize {
        self.pending.lock().listeners.len()
    }

    fn mark_dead(&self) {
        reject_all(&self.pending);
    }

    fn terminate(&self) {
        self.mark_dead();
        self.process.lock().terminate();
        self.reader_task.abort();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[derive(Default)]
struct WorkerSlot {
    handle: Option<Arc<WorkerHandle>>,
    /// Consecutive worker deaths or spawn failures since the last good reply
    failures: Arc<AtomicU32>,
}

/// Removes a job's listener when the dispatch future finishes or is dropped.
///
/// A listener still registered at that point belongs to a job that never got
/// its reply, so its id is remembered as abandoned.
struct ListenerGuard {
    pending: Arc<Mutex<PendingJobs>>,
    id: String,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.pending.lock().abandon(&self.id);
    }
}

/// Dispatches build jobs to a fixed number of lazily started workers.
pub struct WorkerPool {
    spawner: Arc<dyn WorkerSpawner>,
    config: PoolConfig,
    slots: Mutex<Vec<WorkerSlot>>,
    /// Serializes (re)spawning per slot
    spawn_locks: Vec<tokio::sync::Mutex<()>>,
}

impl WorkerPool {
    pub fn new(spawner: Arc<dyn WorkerSpawner>, config: PoolConfig) -> Self {
        let size = config.size.max(1);
        Self {
            spawner,
            slots: Mutex::new((0..size).map(|_| WorkerSlot::default()).collect()),
            spawn_locks: (0..size).map(|_| tokio::sync::Mutex::new(())).collect(),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of workers currently running.
    pub fn live_workers(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| slot.handle.as_ref().is_some_and(|h| h.is_alive()))
            .count()
    }

    /// Send one job to a worker and wait for its result.
    pub async fn dispatch(&self, entry_file: &Path, opts: &BuildOptions) -> Result<BuildResult> {
        let index = self.least_loaded();
        let worker = self.ensure_worker(index).await?;

        let job = BuildJob::new(entry_file.to_path_buf(), opts.clone());
        let line = encode_line(&job)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = worker.pending.lock();
            if pending.closed {
                return Err(IpcError::WorkerExited.into());
            }
            pending.listeners.insert(
                job.id.clone(),
                Listener {
                    entry_file: job.entry_file.clone(),
                    tx,
                },
            );
        }
        let _guard = ListenerGuard {
            pending: Arc::clone(&worker.pending),
            id: job.id.clone(),
        };

        tracing::debug!(
            "Dispatching {} to worker {} as {}",
            entry_file.display(),
            index,
            job.id
        );

        if let Err(e) = write_line(&worker.writer, &line).await {
            worker.mark_dead();
            return Err(e);
        }

        let reply = match self.config.job_timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    // Jobs run one at a time, so everything queued behind this
                    // one would time out too. Replace the worker instead.
                    tracing::warn!(
                        "Build of {} timed out after {:?}; stopping worker {}",
                        entry_file.display(),
                        after,
                        index
                    );
                    worker.terminate();
                    return Err(BuildError::Timeout {
                        entry: entry_file.to_path_buf(),
                        after,
                    });
                }
            },
            None => rx.await,
        };

        reply.unwrap_or_else(|_| Err(IpcError::WorkerExited.into()))
    }

    /// Close every worker channel and stop worker processes.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<WorkerHandle>> = self
            .slots
            .lock()
            .iter_mut()
            .filter_map(|slot| slot.handle.take())
            .collect();

        for handle in handles {
            if let Err(e) = handle.writer.lock().await.shutdown().await {
                tracing::debug!("Worker input already closed: {}", e);
            }
            handle.terminate();
        }
        tracing::debug!("Worker pool shut down");
    }

    fn least_loaded(&self) -> usize {
        let slots = self.slots.lock();
        slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| match &slot.handle {
                Some(handle) if handle.is_alive() => handle.load(),
                _ => 0,
            })
            .map(|(index, _)| index)
            .unwrap_or(0)
    }

    async fn ensure_worker(&self, index: usize) -> Result<Arc<WorkerHandle>> {
        let _spawning = self.spawn_locks[index].lock().await;

        let failures = {
            let mut slots = self.slots.lock();
            let slot = &mut slots[index];
            if let Some(handle) = &slot.handle {
                if handle.is_alive() {
                    return Ok(Arc::clone(handle));
                }
                slot.handle = None;
                slot.failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("Worker {} died", index);
            }
            Arc::clone(&slot.failures)
        };

        let attempt = failures.load(Ordering::SeqCst);
        if attempt > 0 {
            if attempt >= self.config.restart.max_restarts {
                tracing::error!(
                    "Worker {} failed {} consecutive times; not restarting",
                    index,
                    attempt
                );
                return Err(BuildError::WorkerFatal { attempts: attempt });
            }
            let delay = self.config.restart.backoff(attempt);
            tracing::info!(
                "Restarting worker {} (attempt {}) in {:?}",
                index,
                attempt,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        let channel = match self.spawner.spawn().await {
            Ok(channel) => channel,
            Err(e) => {
                failures.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        let handle = Arc::new(WorkerHandle::start(channel, Arc::clone(&failures)));
        self.slots.lock()[index].handle = Some(Arc::clone(&handle));
        Ok(handle)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for slot in self.slots.get_mut().iter_mut() {
            if let Some(handle) = slot.handle.take() {
                handle.terminate();
            }
        }
    }
}

async fn write_line(writer: &tokio::sync::Mutex<WorkerWriter>, line: &str) -> Result<()> {
    let mut writer = writer.lock().await;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| IpcError::SendFailed(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| IpcError::SendFailed(e.to_string()))?;
    Ok(())
}

/// Reader task: settle listeners until the worker's output closes.
async fn route_responses(
    reader: WorkerReader,
    pending: Arc<Mutex<PendingJobs>>,
    failures: Arc<AtomicU32>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read from worker: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match decode_response(&line) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Ignoring malformed worker message: {}", e);
                continue;
            }
        };
        if !response.is_build() {
            tracing::warn!("Ignoring worker message of type {:?}", response.kind);
            continue;
        }

        let (listener, abandoned) = {
            let mut pending = pending.lock();
            match pending.listeners.remove(&response.id) {
                Some(listener) => (Some(listener), false),
                None => (None, pending.take_abandoned(&response.id)),
            }
        };
        match listener {
            Some(listener) => {
                // Any correlated reply, success or bundler failure, means the
                // worker is healthy.
                failures.store(0, Ordering::SeqCst);
                let outcome = response.into_outcome(&listener.entry_file);
                if let Err(Ok(orphan)) = listener.tx.send(outcome) {
                    discard_orphan(orphan).await;
                }
            }
            None if abandoned => {
                tracing::debug!("Late reply for abandoned job {}", response.id);
                discard_unclaimed(response).await;
            }
            None => {
                tracing::warn!("Ignoring response for unknown job {}", response.id);
            }
        }
    }

    tracing::debug!("Worker output closed");
    reject_all(&pending);
}

/// Close the listener map and reject everything still waiting.
fn reject_all(pending: &Mutex<PendingJobs>) {
    let listeners: Vec<Listener> = {
        let mut pending = pending.lock();
        pending.closed = true;
        pending.listeners.drain().map(|(_, l)| l).collect()
    };
    for listener in listeners {
        let _ = listener.tx.send(Err(IpcError::WorkerExited.into()));
    }
}

/// A late reply for a job this pool abandoned still owns a temp directory.
async fn discard_unclaimed(response: BuildResponse) {
    if !response.resolved {
        return;
    }
    if let Ok(result) = serde_json::from_value::<BuildResult>(response.body) {
        discard_orphan(result).await;
    }
}

async fn discard_orphan(result: BuildResult) {
    tracing::debug!(
        "Removing artifacts of abandoned build {}",
        result.entry_file.display()
    );
    remove_dir_best_effort(&result.artifact_paths.temp_dir).await;
}
