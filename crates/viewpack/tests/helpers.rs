//! Shared test utilities for viewpack tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, UNIX_EPOCH};
use viewpack::config::RestartConfig;
use viewpack::{
    BuildError, BuildRegistry, BuildReporting, BundleEngine, BundleRequest, InProcessSpawner,
    PoolConfig, WorkerPool,
};

/// Engine that concatenates the entry file (and manifest module, if any).
#[derive(Default)]
pub struct FakeEngine {
    pub bundles: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    pub requests: Mutex<Vec<BundleRequest>>,
    /// Manifest module source as seen while bundling
    pub manifests: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let engine = Self::default();
        *engine.delay.lock() = Some(delay);
        Arc::new(engine)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BundleEngine for FakeEngine {
    async fn bundle(&self, request: &BundleRequest) -> viewpack::Result<String> {
        self.bundles.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(BuildError::Bundler {
                entry: request.entry_file.clone(),
                diagnostic: "SyntaxError: Unexpected token (1:4)".to_string(),
            });
        }

        let mut body = format!("/* {} */\n", request.entry_file.display());
        if let Ok(source) = tokio::fs::read_to_string(&request.entry_file).await {
            body.push_str(&source);
        }
        if let Some(extra) = &request.extra_entry {
            let manifest = tokio::fs::read_to_string(&extra.file)
                .await
                .map_err(|e| BuildError::io("reading manifest", e))?;
            self.manifests.lock().push(manifest.clone());
            body.push('\n');
            body.push_str(&manifest);
        }
        Ok(body)
    }

    async fn visualize(&self, bundle: &str) -> viewpack::Result<String> {
        Ok(format!("<html><body>{} bytes</body></html>", bundle.len()))
    }
}

/// Registry backed by in-process workers running `engine`.
pub fn registry_with(engine: Arc<FakeEngine>, pool_size: usize) -> BuildRegistry {
    let spawner = Arc::new(InProcessSpawner::new(engine, Vec::new()));
    let pool = WorkerPool::new(
        spawner,
        PoolConfig {
            size: pool_size,
            job_timeout: Some(Duration::from_secs(30)),
            restart: RestartConfig::default(),
        },
    );
    BuildRegistry::new(pool, BuildReporting::default())
}

/// Write a file and pin its mtime.
pub fn write_with_mtime(path: &Path, contents: &str, millis: u64) -> PathBuf {
    std::fs::write(path, contents).unwrap();
    set_mtime(path, millis);
    path.to_path_buf()
}

pub fn set_mtime(path: &Path, millis: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_millis(millis))
        .unwrap();
}
