//! Build registry tests.
//!
//! These run the full pipeline (registry, worker pool, worker loop,
//! packaging, read-back) against an in-process worker with a fake engine.

mod helpers;

use helpers::{FakeEngine, registry_with, set_mtime, write_with_mtime};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use viewpack::{BuildError, BuildFlags, BuildOptions, Manifest};

fn dev_flags() -> BuildFlags {
    BuildFlags::resolve(false, &Default::default())
}

#[tokio::test]
async fn test_unchanged_entry_is_served_from_cache() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "var a = 1;", 100);
    let engine = FakeEngine::new();
    let registry = registry_with(engine.clone(), 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    let first = registry.get_or_build(&entry, &opts).await.unwrap();
    let second = registry.get_or_build(&entry, &opts).await.unwrap();

    assert_eq!(first.bundle, second.bundle);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.bundle.contains("var a = 1;"));
    assert_eq!(registry.compile_count(), 1);
    assert_eq!(engine.bundle_count(), 1);
    assert!(registry.readiness(&entry).await.unwrap());
}

#[tokio::test]
async fn test_touched_watch_file_forces_one_rebuild() {
    let temp = TempDir::new().unwrap();
    let a = write_with_mtime(&temp.path().join("a.js"), "a", 100);
    let b = write_with_mtime(&temp.path().join("b.js"), "b", 100);
    let engine = FakeEngine::new();
    let registry = registry_with(engine.clone(), 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([a.clone(), b.clone()]);

    registry.get_or_build(&a, &opts).await.unwrap();
    registry.get_or_build(&a, &opts).await.unwrap();
    assert_eq!(registry.compile_count(), 1);
    assert_eq!(
        registry.cached(&a).unwrap().watched_mtimes,
        vec![Some(100), Some(100)]
    );

    set_mtime(&b, 150);
    registry.get_or_build(&a, &opts).await.unwrap();
    registry.get_or_build(&a, &opts).await.unwrap();
    assert_eq!(registry.compile_count(), 2);
    assert_eq!(
        registry.cached(&a).unwrap().watched_mtimes,
        vec![Some(100), Some(150)]
    );
}

#[tokio::test]
async fn test_changed_watch_list_length_forces_rebuild() {
    let temp = TempDir::new().unwrap();
    let a = write_with_mtime(&temp.path().join("a.js"), "a", 100);
    let b = write_with_mtime(&temp.path().join("b.js"), "b", 100);
    let registry = registry_with(FakeEngine::new(), 1);

    let narrow = BuildOptions::new(dev_flags()).with_entries([a.clone()]);
    let wide = BuildOptions::new(dev_flags()).with_entries([a.clone(), b]);
    registry.get_or_build(&a, &narrow).await.unwrap();
    registry.get_or_build(&a, &wide).await.unwrap();
    assert_eq!(registry.compile_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_build() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "shared();", 100);
    let engine = FakeEngine::slow(Duration::from_millis(200));
    let registry = registry_with(engine.clone(), 2);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let entry = entry.clone();
            let opts = opts.clone();
            tokio::spawn(async move { registry.get_or_build(&entry, &opts).await })
        })
        .collect();

    let mut checksums = Vec::new();
    for caller in callers {
        let output = caller.await.unwrap().unwrap();
        checksums.push(output.result.checksums.bundle.clone());
    }

    assert_eq!(engine.bundle_count(), 1);
    assert_eq!(registry.compile_count(), 1);
    assert!(checksums.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_dropped_caller_does_not_cancel_build() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "x", 100);
    let engine = FakeEngine::slow(Duration::from_millis(100));
    let registry = registry_with(engine.clone(), 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        registry.get_or_build(&entry, &opts),
    )
    .await;
    assert!(abandoned.is_err());

    assert!(registry.readiness(&entry).await.unwrap());
    registry.get_or_build(&entry, &opts).await.unwrap();
    assert_eq!(engine.bundle_count(), 1);
}

#[tokio::test]
async fn test_identical_inputs_give_identical_checksums() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "same();", 100);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    let one = registry_with(FakeEngine::new(), 1)
        .get_or_build(&entry, &opts)
        .await
        .unwrap();
    let two = registry_with(FakeEngine::new(), 1)
        .get_or_build(&entry, &opts)
        .await
        .unwrap();
    assert_eq!(one.result.checksums, two.result.checksums);
}

#[tokio::test]
async fn test_failure_is_not_cached_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "x", 100);
    let engine = FakeEngine::new();
    engine.set_failing(true);
    let registry = registry_with(engine.clone(), 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);
    let manifest = Manifest::new().with_view("index", &entry);

    let err = registry
        .get_or_build_with_manifest(&entry, &opts, manifest.clone())
        .await
        .unwrap_err();
    assert!(err.is_bundler_failure());
    assert!(err.to_string().contains("Unexpected token"));
    assert!(!registry.readiness(&entry).await.unwrap());
    assert!(matches!(
        registry.last_error(&entry),
        Some(BuildError::Bundler { .. })
    ));
    assert!(registry.cached(&entry).is_none());

    let manifest_dir: PathBuf = engine.requests.lock()[0]
        .extra_entry
        .as_ref()
        .unwrap()
        .file
        .parent()
        .unwrap()
        .to_path_buf();
    assert!(!manifest_dir.exists());

    engine.set_failing(false);
    let output = registry
        .get_or_build_with_manifest(&entry, &opts, manifest)
        .await
        .unwrap();
    assert!(output.bundle.contains("mod.views[\"index\"]"));
    assert!(registry.readiness(&entry).await.unwrap());
    assert_eq!(registry.compile_count(), 2);
}

#[tokio::test]
async fn test_manifest_is_exposed_and_removed() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "x", 100);
    let view = temp.path().join("home.ejs.js");
    let engine = FakeEngine::new();
    let registry = registry_with(engine.clone(), 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    let manifest = Manifest::new()
        .with_field("dirname", serde_json::json!("/srv/app"))
        .with_view("home", &view);
    registry
        .get_or_build_with_manifest(&entry, &opts, manifest)
        .await
        .unwrap();

    let request = engine.requests.lock()[0].clone();
    let extra = request.extra_entry.unwrap();
    assert_eq!(extra.expose, "viewpack-self");
    assert!(!extra.file.exists());

    let source = engine.manifests.lock()[0].clone();
    assert!(source.contains(r#""browser":true"#));
    assert!(!source.contains("/srv/app"));
    assert!(source.contains(&format!(
        "mod.views[\"home\"] = require({});",
        serde_json::to_string(&view.to_string_lossy()).unwrap()
    )));
}

#[tokio::test]
async fn test_visualization_present_iff_enabled() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "x", 100);
    let registry = registry_with(FakeEngine::new(), 1);

    let without = BuildOptions::new(BuildFlags::resolve(true, &Default::default()))
        .with_entries([entry.clone()]);
    let output = registry.get_or_build(&entry, &without).await.unwrap();
    assert!(output.disc.is_none());
    assert!(output.result.checksums.disc.is_none());

    let other = write_with_mtime(&temp.path().join("other.js"), "y", 100);
    let with = BuildOptions::new(dev_flags()).with_entries([other.clone()]);
    let output = registry.get_or_build(&other, &with).await.unwrap();
    assert!(output.disc.as_deref().unwrap().starts_with("<html>"));
    assert!(output.result.feature_summary.contains("disc=true"));
}

#[tokio::test]
async fn test_readiness_of_unknown_entry_is_an_error() {
    let registry = registry_with(FakeEngine::new(), 1);
    let err = registry.readiness("/never/built.js").await.unwrap_err();
    assert!(matches!(err, BuildError::UnknownEntry(path) if path == PathBuf::from("/never/built.js")));
}

#[tokio::test]
async fn test_readiness_waits_for_in_flight_build() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "x", 100);
    let engine = FakeEngine::slow(Duration::from_millis(100));
    let registry = registry_with(engine, 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    let build = {
        let registry = registry.clone();
        let entry = entry.clone();
        tokio::spawn(async move { registry.get_or_build(&entry, &opts).await })
    };
    while registry.compile_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(registry.readiness(&entry).await.unwrap());
    build.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_equivalent_paths_share_a_slot() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "x", 100);
    let registry = registry_with(FakeEngine::new(), 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    let roundabout = temp.path().join("sub").join("..").join("index.js");
    registry.get_or_build(&entry, &opts).await.unwrap();
    registry.get_or_build(&roundabout, &opts).await.unwrap();
    assert_eq!(registry.compile_count(), 1);
}

#[tokio::test]
async fn test_shutdown_keeps_cache_readable() {
    let temp = TempDir::new().unwrap();
    let entry = write_with_mtime(&temp.path().join("index.js"), "x", 100);
    let registry = registry_with(FakeEngine::new(), 1);
    let opts = BuildOptions::new(dev_flags()).with_entries([entry.clone()]);

    registry.get_or_build(&entry, &opts).await.unwrap();
    registry.shutdown().await;
    assert!(registry.get_or_build(&entry, &opts).await.is_ok());
    assert_eq!(registry.compile_count(), 1);
}
