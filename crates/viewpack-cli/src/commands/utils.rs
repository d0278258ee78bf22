//! Shared setup for `build` and `serve`.

use crate::cli::BundleArgs;
use crate::error::{CliError, ConfigError, Result, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use viewpack::views::{FilesystemViewLoader, SearchOptions};
use viewpack::{BuildOptions, Manifest, ProcessSpawner, ViewLoader, ViewpackConfig, WorkerSpawner};

/// Everything a command needs to request a bundle.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: ViewpackConfig,
    pub entry: PathBuf,
    pub opts: BuildOptions,
    pub manifest: Option<Manifest>,
}

/// Resolve a path against `root` unless it is already absolute.
pub fn resolve_path(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Check that the entry exists and is a file.
pub fn validate_entry(entry: &Path) -> Result<()> {
    if !entry.exists() {
        return Err(CliError::FileNotFound(entry.to_path_buf()));
    }
    if !entry.is_file() {
        return Err(CliError::InvalidArgument(format!(
            "Entry point is not a file: {}",
            entry.display()
        )));
    }
    Ok(())
}

/// Canonical project root.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    match std::fs::canonicalize(root) {
        Ok(path) if path.is_dir() => Ok(path),
        _ => Err(ConfigError::RootNotFound(root.to_path_buf()).into()),
    }
}

/// Load the project configuration and apply the command-line flag overrides.
pub fn load_config(root: &Path, extra_opts: Option<&str>) -> Result<ViewpackConfig> {
    let mut config = ViewpackConfig::load(root)?;
    if let Some(extra) = extra_opts {
        config.opts = format!("{} {}", config.opts, extra).trim().to_string();
    }
    Ok(config)
}

/// Resolve arguments into a [`Project`].
///
/// The watch list is the entry, every discovered view, and any `--watch`
/// files, in that order.
pub fn prepare(args: &BundleArgs) -> Result<Project> {
    let root = resolve_root(&args.root)?;
    let config = load_config(&root, args.opts.as_deref())?;

    let entry = resolve_path(&args.entry, &root);
    validate_entry(&entry)?;

    let mut watched = vec![entry.clone()];
    let manifest = match &args.views {
        Some(views) => {
            let dir = resolve_path(views, &root);
            if !dir.is_dir() {
                return Err(ConfigError::ViewsNotFound(dir).into());
            }
            let loader = FilesystemViewLoader::new(dir).with_options(SearchOptions {
                sub_extension: args.sub_extension.clone(),
                require_sub_extension: args.require_sub_extension,
                ..SearchOptions::default()
            });
            let manifest = loader.load().context("Loading views")?;
            for (_, file) in manifest.views().context("Reading view manifest")? {
                watched.push(file);
            }
            Some(manifest)
        }
        None => None,
    };
    watched.extend(args.watch.iter().map(|file| resolve_path(file, &root)));

    let opts = BuildOptions::new(config.build_flags())
        .with_entries(watched)
        .with_node_files(args.node_files.iter().map(|file| resolve_path(file, &root)));

    Ok(Project {
        root,
        config,
        entry,
        opts,
        manifest,
    })
}

/// Spawner that runs workers as `<this binary> worker` inside `root`.
pub fn worker_spawner(root: &Path) -> Result<Arc<dyn WorkerSpawner>> {
    Ok(Arc::new(ProcessSpawner::current_exe()?.current_dir(root)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn bundle_args(root: &Path, entry: &str) -> BundleArgs {
        BundleArgs {
            entry: PathBuf::from(entry),
            root: root.to_path_buf(),
            views: None,
            sub_extension: None,
            require_sub_extension: false,
            watch: Vec::new(),
            node_files: Vec::new(),
            opts: None,
        }
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            resolve_path(Path::new("/abs/a.js"), Path::new("/root")),
            PathBuf::from("/abs/a.js")
        );
        assert_eq!(
            resolve_path(Path::new("a.js"), Path::new("/root")),
            PathBuf::from("/root/a.js")
        );
    }

    #[test]
    fn test_validate_entry() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            validate_entry(&temp.path().join("missing.js")),
            Err(CliError::FileNotFound(_))
        ));
        assert!(matches!(
            validate_entry(temp.path()),
            Err(CliError::InvalidArgument(_))
        ));
        let file = temp.path().join("index.js");
        fs::write(&file, "").unwrap();
        assert!(validate_entry(&file).is_ok());
    }

    #[test]
    fn test_missing_root() {
        assert!(matches!(
            resolve_root(Path::new("/definitely/not/here")),
            Err(CliError::Config(ConfigError::RootNotFound(_)))
        ));
    }

    #[test]
    #[serial_test::serial]
    fn test_prepare_collects_watch_list_and_manifest() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.js"), "require('viewpack-self');").unwrap();
        fs::create_dir_all(temp.path().join("views/users")).unwrap();
        fs::write(temp.path().join("views/home.js"), "").unwrap();
        fs::write(temp.path().join("views/users/list.js"), "").unwrap();
        fs::write(temp.path().join("layout.css"), "").unwrap();

        let mut args = bundle_args(temp.path(), "index.js");
        args.views = Some(PathBuf::from("views"));
        args.watch = vec![PathBuf::from("layout.css")];
        args.opts = Some("+production".to_string());

        let project = prepare(&args).unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        assert_eq!(project.entry, root.join("index.js"));
        assert_eq!(
            project.opts.entries,
            vec![
                root.join("index.js"),
                root.join("views/home.js"),
                root.join("views/users/list.js"),
                root.join("layout.css"),
            ]
        );
        assert!(project.opts.flags.is_production_build);

        let views = project.manifest.unwrap().views().unwrap();
        let names: Vec<&str> = views.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["home", "users.list"]);
    }

    #[test]
    #[serial_test::serial]
    fn test_prepare_rejects_missing_views_dir() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.js"), "").unwrap();
        let mut args = bundle_args(temp.path(), "index.js");
        args.views = Some(PathBuf::from("nope"));
        assert!(matches!(
            prepare(&args),
            Err(CliError::Config(ConfigError::ViewsNotFound(_)))
        ));
    }

    #[test]
    #[serial_test::serial]
    fn test_invalid_config_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("viewpack.toml"), "pool_size = 0\n").unwrap();
        assert!(matches!(
            load_config(temp.path(), None),
            Err(CliError::Config(ConfigError::Invalid(_)))
        ));
    }
}
