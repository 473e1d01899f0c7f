//! Dashboard static assets with single-page-app fallback.
//!
//! A path naming an existing file is served as-is. A missing path without
//! an extension is a client-side route and gets `index.html`; a missing
//! path with an extension is a 404.

use std::path::{Component, Path as FsPath, PathBuf};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::http::server::AppState;

const INDEX_HTML: &str = "index.html";

#[derive(Debug, PartialEq, Eq)]
enum Asset {
    File(PathBuf),
    NotFound,
    IndexMissing,
}

pub async fn admin_index(State(state): State<AppState>, request: Request<Body>) -> Response {
    serve(&state.config.dashboard.static_dir, "", request).await
}

pub async fn admin_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Response {
    serve(&state.config.dashboard.static_dir, &path, request).await
}

async fn serve(static_dir: &FsPath, relative: &str, request: Request<Body>) -> Response {
    match resolve(static_dir, relative).await {
        Asset::File(file) => match ServeFile::new(file).oneshot(request).await {
            Ok(response) => response.into_response(),
            Err(never) => match never {},
        },
        Asset::NotFound => (StatusCode::NOT_FOUND, "File not found").into_response(),
        Asset::IndexMissing => {
            tracing::error!(static_dir = %static_dir.display(), "Dashboard index.html not found");
            (StatusCode::INTERNAL_SERVER_ERROR, "index.html not found").into_response()
        }
    }
}

async fn is_file(path: &FsPath) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn resolve(static_dir: &FsPath, relative: &str) -> Asset {
    let relative = FsPath::new(relative.trim_start_matches('/'));
    let index = static_dir.join(INDEX_HTML);

    // Only plain components; anything else could escape the asset directory.
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Asset::NotFound;
    }

    if !relative.as_os_str().is_empty() {
        let candidate = static_dir.join(relative);
        if is_file(&candidate).await {
            return Asset::File(candidate);
        }
        let looks_like_file = relative
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains('.'));
        if looks_like_file {
            return Asset::NotFound;
        }
    }

    if is_file(&index).await {
        Asset::File(index)
    } else {
        Asset::IndexMissing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_HTML), "<html></html>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();
        dir
    }

    #[tokio::test]
    async fn existing_file_served() {
        let dir = static_dir();
        assert_eq!(
            resolve(dir.path(), "assets/app.js").await,
            Asset::File(dir.path().join("assets/app.js"))
        );
    }

    #[tokio::test]
    async fn client_route_falls_back_to_index() {
        let dir = static_dir();
        let index = Asset::File(dir.path().join(INDEX_HTML));
        assert_eq!(resolve(dir.path(), "").await, index);
        assert_eq!(resolve(dir.path(), "dashboard/errors").await, index);
    }

    #[tokio::test]
    async fn missing_asset_is_not_found() {
        let dir = static_dir();
        assert_eq!(resolve(dir.path(), "assets/missing.css").await, Asset::NotFound);
        assert_eq!(resolve(dir.path(), "../secret.txt").await, Asset::NotFound);
    }

    #[tokio::test]
    async fn missing_index_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(resolve(dir.path(), "").await, Asset::IndexMissing);
    }
}
