//! View discovery.
//!
//! On the server, views are found by scanning a directory tree; inside a
//! client bundle they come from the embedded manifest module. The target is
//! chosen once, when the loader is constructed.

use crate::error::{BuildError, IoResultExt, Result};
use crate::materialize::Manifest;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where the views are being loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Request-serving process with filesystem access
    Server,
    /// Code running from a built bundle
    ClientBundle,
}

/// Source of the named views.
pub trait ViewLoader: Send + Sync {
    fn target(&self) -> Target;

    /// Manifest with one `views` entry per discovered view.
    fn load(&self) -> Result<Manifest>;
}

/// Filename matching rules for [`FilesystemViewLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Primary extension, dot included
    pub extension: String,
    /// Optional inner extension such as `.ejs` in `index.ejs.js`
    pub sub_extension: Option<String>,
    /// Only accept files carrying both extensions
    pub require_sub_extension: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            extension: ".js".to_string(),
            sub_extension: None,
            require_sub_extension: false,
        }
    }
}

impl SearchOptions {
    fn has_extension(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| ext == self.extension)
    }

    fn has_sub_extension(&self, path: &Path) -> bool {
        let Some(sub) = &self.sub_extension else {
            return false;
        };
        path.file_stem()
            .map(Path::new)
            .and_then(extension_of)
            .is_some_and(|ext| &ext == sub)
    }

    fn matches(&self, path: &Path) -> bool {
        if self.require_sub_extension {
            self.has_extension(path) && self.has_sub_extension(path)
        } else {
            self.has_extension(path) || self.has_sub_extension(path)
        }
    }

    /// View name for a matching file: the stem, minus the sub-extension.
    fn view_name(&self, path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &self.sub_extension {
            Some(sub) if stem.ends_with(sub.as_str()) && stem.len() > sub.len() => {
                stem[..stem.len() - sub.len()].to_string()
            }
            _ => stem,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}

/// Scans a directory tree for view modules.
///
/// Nested directories produce dotted names (`users/list.js` is
/// `users.list`). Within a directory, files are visited before
/// subdirectories, each in name order; on a name clash the later one wins.
#[derive(Debug, Clone)]
pub struct FilesystemViewLoader {
    root: PathBuf,
    options: SearchOptions,
}

impl FilesystemViewLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: SearchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every discovered view, by name.
    pub fn discover(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut found = BTreeMap::new();
        if !self.root.is_dir() {
            let name = self.options.view_name(&self.root);
            found.insert(name, self.root.clone());
            return Ok(found);
        }
        self.scan(&self.root, None, &mut found)?;
        Ok(found)
    }

    fn scan(
        &self,
        dir: &Path,
        parent: Option<&str>,
        found: &mut BTreeMap<String, PathBuf>,
    ) -> Result<()> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry
                .map_err(|e| BuildError::io(format!("scanning {}", dir.display()), e.into()))?;
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            } else {
                files.push(entry.into_path());
            }
        }

        for file in files.into_iter().filter(|f| self.options.matches(f)) {
            let name = qualify(parent, &self.options.view_name(&file));
            if let Some(previous) = found.insert(name.clone(), file.clone()) {
                tracing::warn!(
                    "Multiple files conflict for view {}; using {} over {}",
                    name,
                    file.display(),
                    previous.display()
                );
            }
        }

        for sub in dirs {
            let base = sub
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = qualify(parent, &base);
            if found.remove(&name).is_some() {
                tracing::warn!(
                    "View {} conflicts with directory {}; directory takes preference",
                    name,
                    sub.display()
                );
            }
            self.scan(&sub, Some(&name), found)?;
        }
        Ok(())
    }
}

fn qualify(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}.{name}"),
        None => name.to_string(),
    }
}

impl ViewLoader for FilesystemViewLoader {
    fn target(&self) -> Target {
        Target::Server
    }

    fn load(&self) -> Result<Manifest> {
        let dirname = std::fs::canonicalize(&self.root)
            .io_context(|| format!("resolving {}", self.root.display()))?;
        let mut manifest = Manifest::new().with_field(
            "dirname",
            Value::String(dirname.to_string_lossy().into_owned()),
        );
        for (name, file) in self.discover()? {
            manifest = manifest.with_view(name, file);
        }
        Ok(manifest)
    }
}

/// Views compiled into a bundle.
#[derive(Debug, Clone)]
pub struct EmbeddedViewLoader {
    manifest: Manifest,
}

impl EmbeddedViewLoader {
    pub fn new(manifest: Manifest) -> Self {
        Self { manifest }
    }
}

impl ViewLoader for EmbeddedViewLoader {
    fn target(&self) -> Target {
        Target::ClientBundle
    }

    fn load(&self) -> Result<Manifest> {
        Ok(self.manifest.clone())
    }
}

/// Pick the loader for `target`.
///
/// The server scans `root`; a client bundle needs the embedded manifest.
pub fn loader_for(
    target: Target,
    root: impl Into<PathBuf>,
    embedded: Option<Manifest>,
) -> Result<Box<dyn ViewLoader>> {
    match target {
        Target::Server => Ok(Box::new(FilesystemViewLoader::new(root))),
        Target::ClientBundle => embedded
            .map(|manifest| Box::new(EmbeddedViewLoader::new(manifest)) as Box<dyn ViewLoader>)
            .ok_or_else(|| {
                BuildError::Config("client bundle has no embedded view manifest".to_string())
            }),
    }
}
