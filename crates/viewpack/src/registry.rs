//! Build request registry.
//!
//! One slot per entry file. A slot is either building (a shared future that
//! every concurrent caller awaits), ready (an immutable cache entry), or
//! failed (the error of the last attempt, never served as a bundle). The
//! slot map lock is only held for synchronous reads and swaps.

use crate::cleanup::with_cleanup;
use crate::config::ViewpackConfig;
use crate::error::{BuildError, IoResultExt, Result};
use crate::materialize::{Manifest, materialize};
use crate::package::read_back;
use crate::staleness::{Mtime, compute_staleness, snapshot};
use crate::types::{BuildOptions, BuildOutput};
use crate::worker::{PoolConfig, WorkerPool, WorkerSpawner};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use path_clean::PathClean;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Instant, SystemTime};

type SharedBuild = Shared<BoxFuture<'static, Result<Arc<BuildOutput>>>>;

/// Cached outcome of a successful build. Replaced wholesale on rebuild.
#[derive(Debug)]
pub struct BuildCacheEntry {
    pub entry_file: PathBuf,
    /// Mtimes of the watch list taken when the build started
    pub watched_mtimes: Vec<Mtime>,
    pub output: Arc<BuildOutput>,
    pub created_at: SystemTime,
}

enum Slot {
    Building(SharedBuild),
    Ready(Arc<BuildCacheEntry>),
    Failed(BuildError),
}

/// What a caller saw in the slot before deciding to build.
enum Observed {
    Vacant,
    Ready(Arc<BuildCacheEntry>),
    Building(SharedBuild),
}

/// Which build outcomes are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReporting {
    /// Successful builds at info level
    pub messages: bool,
    /// Failed builds at error level
    pub errors: bool,
}

impl Default for BuildReporting {
    fn default() -> Self {
        Self {
            messages: true,
            errors: true,
        }
    }
}

struct RegistryInner {
    pool: WorkerPool,
    slots: Mutex<HashMap<PathBuf, Slot>>,
    compiles: AtomicUsize,
    reporting: BuildReporting,
}

/// Cache of built bundles, keyed by entry file.
///
/// Cheap to clone; clones share the cache and the worker pool.
#[derive(Clone)]
pub struct BuildRegistry {
    inner: Arc<RegistryInner>,
}

impl BuildRegistry {
    pub fn new(pool: WorkerPool, reporting: BuildReporting) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                pool,
                slots: Mutex::new(HashMap::new()),
                compiles: AtomicUsize::new(0),
                reporting,
            }),
        }
    }

    /// Registry with a pool sized and configured from `config`.
    pub fn from_config(config: &ViewpackConfig, spawner: Arc<dyn WorkerSpawner>) -> Self {
        Self::new(
            WorkerPool::new(spawner, PoolConfig::from(config)),
            BuildReporting {
                messages: config.messages,
                errors: config.errors,
            },
        )
    }

    /// Return the bundle for `entry_file`, building it if needed.
    pub async fn get_or_build(
        &self,
        entry_file: impl AsRef<Path>,
        opts: &BuildOptions,
    ) -> Result<Arc<BuildOutput>> {
        self.resolve(entry_file.as_ref(), opts, None).await
    }

    /// Like [`BuildRegistry::get_or_build`], exposing `manifest` to the bundle
    /// as a generated module.
    pub async fn get_or_build_with_manifest(
        &self,
        entry_file: impl AsRef<Path>,
        opts: &BuildOptions,
        manifest: Manifest,
    ) -> Result<Arc<BuildOutput>> {
        self.resolve(entry_file.as_ref(), opts, Some(Arc::new(manifest)))
            .await
    }

    /// Whether the last build of `entry_file` succeeded.
    ///
    /// Waits for an in-flight build. Errors if no build was ever started.
    pub async fn readiness(&self, entry_file: impl AsRef<Path>) -> Result<bool> {
        let key = cache_key(entry_file.as_ref())?;
        let pending = {
            let slots = self.inner.slots.lock();
            match slots.get(&key) {
                None => return Err(BuildError::UnknownEntry(key)),
                Some(Slot::Ready(_)) => return Ok(true),
                Some(Slot::Failed(_)) => return Ok(false),
                Some(Slot::Building(future)) => future.clone(),
            }
        };
        Ok(pending.await.is_ok())
    }

    /// Current cache entry for `entry_file`, if its last build succeeded.
    pub fn cached(&self, entry_file: impl AsRef<Path>) -> Option<Arc<BuildCacheEntry>> {
        let key = cache_key(entry_file.as_ref()).ok()?;
        match self.inner.slots.lock().get(&key) {
            Some(Slot::Ready(entry)) => Some(Arc::clone(entry)),
            _ => None,
        }
    }

    /// Error of the last build of `entry_file`, if it failed.
    pub fn last_error(&self, entry_file: impl AsRef<Path>) -> Option<BuildError> {
        let key = cache_key(entry_file.as_ref()).ok()?;
        match self.inner.slots.lock().get(&key) {
            Some(Slot::Failed(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Number of builds dispatched so far.
    pub fn compile_count(&self) -> usize {
        self.inner.compiles.load(Ordering::SeqCst)
    }

    /// Stop the worker pool. Cached outputs stay readable.
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }

    async fn resolve(
        &self,
        entry_file: &Path,
        opts: &BuildOptions,
        manifest: Option<Arc<Manifest>>,
    ) -> Result<Arc<BuildOutput>> {
        let key = cache_key(entry_file)?;

        loop {
            let observed = match self.inner.slots.lock().get(&key) {
                None | Some(Slot::Failed(_)) => Observed::Vacant,
                Some(Slot::Ready(entry)) => Observed::Ready(Arc::clone(entry)),
                Some(Slot::Building(future)) => Observed::Building(future.clone()),
            };

            let claimed = match observed {
                Observed::Building(future) => {
                    tracing::debug!("Joining in-flight build of {}", key.display());
                    return future.await;
                }
                Observed::Ready(entry) => {
                    let previous = entry.watched_mtimes.as_slice();
                    let staleness = compute_staleness(&opts.entries, Some(previous)).await;
                    if !staleness.changed {
                        return Ok(Arc::clone(&entry.output));
                    }
                    tracing::debug!("{} is stale, rebuilding", key.display());
                    self.claim(&key, opts, manifest.clone(), |slot| {
                        matches!(slot, Some(Slot::Ready(current)) if Arc::ptr_eq(current, &entry))
                    })
                }
                Observed::Vacant => self.claim(&key, opts, manifest.clone(), |slot| {
                    matches!(slot, None | Some(Slot::Failed(_)))
                }),
            };

            match claimed {
                Some(future) => return future.await,
                // Someone else changed the slot first; look again.
                None => continue,
            }
        }
    }

    /// Install a new build in the slot if it still matches what the caller
    /// observed.
    fn claim(
        &self,
        key: &Path,
        opts: &BuildOptions,
        manifest: Option<Arc<Manifest>>,
        unchanged: impl FnOnce(Option<&Slot>) -> bool,
    ) -> Option<SharedBuild> {
        let mut slots = self.inner.slots.lock();
        if !unchanged(slots.get(key)) {
            return None;
        }

        let inner = Arc::clone(&self.inner);
        let task_key = key.to_path_buf();
        let task_opts = opts.clone();
        let handle =
            tokio::spawn(async move { inner.build(task_key, task_opts, manifest).await });

        let future: SharedBuild = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(BuildError::Internal(format!("build task failed: {e}"))),
            }
        }
        .boxed()
        .shared();

        slots.insert(key.to_path_buf(), Slot::Building(future.clone()));
        Some(future)
    }
}

impl RegistryInner {
    /// Run one build and settle the slot with its outcome.
    async fn build(
        &self,
        key: PathBuf,
        opts: BuildOptions,
        manifest: Option<Arc<Manifest>>,
    ) -> Result<Arc<BuildOutput>> {
        let started = Instant::now();
        let watched_mtimes = snapshot(&opts.entries).await;
        self.compiles.fetch_add(1, Ordering::SeqCst);

        match self.compile(&key, opts, manifest).await {
            Ok(output) => {
                let output = Arc::new(output);
                let entry = Arc::new(BuildCacheEntry {
                    entry_file: key.clone(),
                    watched_mtimes,
                    output: Arc::clone(&output),
                    created_at: SystemTime::now(),
                });
                self.slots.lock().insert(key.clone(), Slot::Ready(entry));

                if self.reporting.messages {
                    tracing::info!(
                        "Built {} in {}ms ({})",
                        key.display(),
                        started.elapsed().as_millis(),
                        output.result.feature_summary
                    );
                }
                Ok(output)
            }
            Err(e) => {
                self.slots.lock().insert(key.clone(), Slot::Failed(e.clone()));
                if self.reporting.errors {
                    tracing::error!("Failed to build {}: {}", key.display(), e);
                }
                Err(e)
            }
        }
    }

    async fn compile(
        &self,
        key: &Path,
        opts: BuildOptions,
        manifest: Option<Arc<Manifest>>,
    ) -> Result<BuildOutput> {
        let result = match manifest {
            Some(manifest) => {
                let artifact = materialize(&manifest).await?;
                let pool = &self.pool;
                with_cleanup(artifact, |file| async move {
                    let mut opts = opts;
                    opts.manifest_file = Some(file);
                    pool.dispatch(key, &opts).await
                })
                .await
            }
            None => self.pool.dispatch(key, &opts).await,
        }?;
        read_back(result).await
    }
}

/// Absolute, lexically cleaned form of `entry_file`, used as the cache key.
pub fn cache_key(entry_file: &Path) -> Result<PathBuf> {
    if entry_file.is_absolute() {
        return Ok(entry_file.clean());
    }
    let cwd = std::env::current_dir().io_context(|| "reading current directory".to_string())?;
    Ok(cwd.join(entry_file).clean())
}
