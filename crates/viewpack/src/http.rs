//! HTTP responses for built bundles.

use crate::materialize::Manifest;
use crate::registry::BuildRegistry;
use crate::types::BuildOptions;
use axum::{
    Router,
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::path::{Path, PathBuf};

pub const JAVASCRIPT: &str = "application/javascript; charset=UTF-8";
pub const HTML: &str = "text/html; charset=UTF-8";

/// Build (or reuse) the bundle for `entry_file` and render it for
/// `request_path`.
///
/// A `.html` path serves the visualization when the build has it enabled;
/// everything else serves the script. Failures never produce a partial
/// script: they become a `500` with a plain-text message.
pub async fn bundle_response(
    registry: &BuildRegistry,
    entry_file: &Path,
    opts: &BuildOptions,
    manifest: Option<Manifest>,
    request_path: &str,
) -> Response {
    let built = match manifest {
        Some(manifest) => {
            registry
                .get_or_build_with_manifest(entry_file, opts, manifest)
                .await
        }
        None => registry.get_or_build(entry_file, opts).await,
    };

    let output = match built {
        Ok(output) => output,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
                format!("Failed to build {}: {}", entry_file.display(), e),
            )
                .into_response();
        }
    };

    let wants_html = request_path.ends_with(".html") && opts.flags.use_disc;
    if wants_html {
        return match &output.disc {
            Some(html) => respond(HTML, html.clone()),
            None => (
                StatusCode::NOT_FOUND,
                format!("No visualization available for {}", entry_file.display()),
            )
                .into_response(),
        };
    }

    respond(JAVASCRIPT, output.bundle.clone())
}

fn respond(content_type: &'static str, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from(body),
    )
        .into_response()
}

/// A bundle served under `/<name>.js` (and `/<name>.html` for the
/// visualization).
#[derive(Debug, Clone)]
pub struct BundleRoute {
    pub name: String,
    pub entry_file: PathBuf,
    pub opts: BuildOptions,
    pub manifest: Option<Manifest>,
}

/// Router serving every route from `registry`.
pub fn router(registry: BuildRegistry, routes: Vec<BundleRoute>) -> Router {
    let mut app = Router::new();
    for route in routes {
        for suffix in ["js", "html"] {
            let path = format!("/{}.{}", route.name.trim_matches('/'), suffix);
            let registry = registry.clone();
            let route = route.clone();
            let request_path = path.clone();
            app = app.route(
                &path,
                get(move || async move {
                    bundle_response(
                        &registry,
                        &route.entry_file,
                        &route.opts,
                        route.manifest.clone(),
                        &request_path,
                    )
                    .await
                }),
            );
        }
    }
    app
}
