//! Materialize an in-memory manifest as a module the bundler can consume.
//!
//! The manifest is written as `mvc.js` inside a fresh temp directory. Its
//! plain fields are inlined as JSON; every named view is re-established with
//! a `require()` of its original source file, so the bundler resolves view
//! code through its own dependency graph instead of a serialized copy.

use crate::cleanup::TempArtifact;
use crate::error::{BuildError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// File name of the generated manifest module.
pub const MANIFEST_FILE: &str = "mvc.js";

/// Fields that only make sense on the server and are dropped from bundles.
const SERVER_ONLY_FIELDS: &[&str] = &["filename", "dirname"];

/// View metadata plus a `views` mapping of name to `{ "file": ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    /// Empty manifest with an empty `views` map.
    pub fn new() -> Self {
        let mut fields = Map::new();
        fields.insert("views".to_string(), Value::Object(Map::new()));
        Self(fields)
    }

    /// Wrap an arbitrary JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(BuildError::Config(format!(
                "manifest must be a JSON object, got {other}"
            ))),
        }
    }

    /// Set a top-level field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Register a view by name, pointing at its source module.
    pub fn with_view(mut self, name: impl Into<String>, file: impl AsRef<Path>) -> Self {
        let mut view = Map::new();
        view.insert(
            "file".to_string(),
            Value::String(file.as_ref().to_string_lossy().into_owned()),
        );
        let views = self
            .0
            .entry("views")
            .or_insert_with(|| Value::Object(Map::new()));
        if !views.is_object() {
            *views = Value::Object(Map::new());
        }
        if let Value::Object(views) = views {
            views.insert(name.into(), Value::Object(view));
        }
        self
    }

    /// Top-level field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Named views with the source file each one refers to.
    pub fn views(&self) -> Result<Vec<(String, PathBuf)>> {
        let Some(views) = self.0.get("views") else {
            return Ok(Vec::new());
        };
        let Value::Object(views) = views else {
            return Err(BuildError::Config("manifest 'views' must be an object".to_string()));
        };
        views
            .iter()
            .map(|(name, view)| {
                view.get("file")
                    .and_then(Value::as_str)
                    .map(|file| (name.clone(), PathBuf::from(file)))
                    .ok_or_else(|| {
                        BuildError::Config(format!("view '{name}' has no 'file' string"))
                    })
            })
            .collect()
    }

    /// Copy prepared for the browser: server-only fields stripped, the
    /// `browser` marker set, `views` guaranteed present.
    pub fn for_browser(&self) -> Map<String, Value> {
        let mut fields = self.0.clone();
        for key in SERVER_ONLY_FIELDS {
            fields.remove(*key);
        }
        fields.insert("browser".to_string(), Value::Bool(true));
        fields
            .entry("views")
            .or_insert_with(|| Value::Object(Map::new()));
        fields
    }
}

/// Generate the module source for a manifest.
pub fn render_module(manifest: &Manifest) -> Result<String> {
    let views = manifest.views()?;
    let body = serde_json::to_string(&manifest.for_browser())
        .map_err(|e| BuildError::Config(format!("manifest is not serializable: {e}")))?;

    let mut code = vec![format!("var mod = module.exports = {body};")];
    for (name, file) in views {
        let name = serde_json::to_string(&name)
            .map_err(|e| BuildError::Config(format!("bad view name: {e}")))?;
        let file = serde_json::to_string(&file.to_string_lossy())
            .map_err(|e| BuildError::Config(format!("bad view path: {e}")))?;
        code.push(format!("mod.views[{name}] = require({file});"));
    }
    Ok(code.join("\n"))
}

/// Write `manifest` to a fresh temp directory.
///
/// On failure the partially created directory is removed before the error
/// is returned.
pub async fn materialize(manifest: &Manifest) -> Result<TempArtifact> {
    let code = render_module(manifest)?;

    let dir = tempfile::Builder::new()
        .prefix("viewpack-manifest-")
        .tempdir()
        .io_context(|| "creating manifest temp directory".to_string())?;
    let file = dir.path().join(MANIFEST_FILE);
    let mut artifact = TempArtifact::new(dir, file);

    if let Err(e) = tokio::fs::write(artifact.file(), code).await {
        let err = BuildError::io(format!("writing {}", artifact.file().display()), e);
        artifact.cleanup();
        return Err(err);
    }

    tracing::debug!("Materialized manifest at {}", artifact.file().display());
    Ok(artifact)
}
