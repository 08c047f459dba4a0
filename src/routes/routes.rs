//! Defines the gallery's HTTP surface.
//!
//! ## Structure
//! - `GET  /`              — upload form and image list
//! - `POST /upload`        — multipart upload (`form_file`), redirects to `/`
//! - `GET  /view/{name}`   — detail page with caption (captioning enabled only)
//! - `GET  /files/{name}`  — raw object bytes
//! - `GET  /health`        — liveness, no dependencies
//! - `GET  /readyz`        — readiness (bucket + scratch directory)
//! - `GET  /version`       — build version and display color

use crate::{
    handlers::{
        gallery_handlers::{index, serve_file, version, view},
        health_handlers::{health, readyz},
        upload_handlers::upload,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router. Without captioning the `/view` route is not mounted and
/// the gallery links straight to `/files`.
pub fn routes(captioning_enabled: bool, max_upload_bytes: usize) -> Router<AppState> {
    let router = Router::new()
        .route("/", get(index))
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files/{name}", get(serve_file))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/version", get(version));

    let router = if captioning_enabled {
        router.route("/view/{name}", get(view))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}
