//! Read-side handlers: gallery listing, detail view, file serving, version.

use crate::{
    errors::AppError,
    models::{
        caption::Caption,
        object::{caption_object_name, guess_content_type, is_jpeg_name, validate_object_name},
    },
    pages,
    services::scratch::ScratchFile,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, Response},
};
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// `GET /` — upload form and every JPEG in the bucket.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let mut images: Vec<String> = state
        .store
        .list_names(&state.bucket)
        .await?
        .into_iter()
        .filter(|name| is_jpeg_name(name))
        .collect();
    images.sort();

    Ok(Html(pages::gallery(
        &state.background_color,
        &images,
        state.captioning_enabled,
    )))
}

/// `GET /view/{name}` — the image with its caption record, if any.
///
/// A missing image is an error; a missing or unreadable caption record just
/// falls back to the default text.
pub async fn view(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Html<String>, AppError> {
    validate_object_name(&name).map_err(AppError::bad_request)?;

    let image = ScratchFile::reserve(&state.scratch_dir, &name);
    state
        .store
        .download(&state.bucket, &name, image.path())
        .await?;

    let caption = match load_caption(&state, &name).await {
        Ok(Some(caption)) => caption,
        Ok(None) => {
            debug!(name = %name, "no caption record");
            Caption::view_default()
        }
        Err(err) => {
            warn!(name = %name, "ignoring unreadable caption record: {:#}", err);
            Caption::view_default()
        }
    };

    let public_url = state.store.public_url(&state.bucket, &name);
    Ok(Html(pages::detail(
        &state.background_color,
        &name,
        &caption,
        &public_url,
    )))
}

async fn load_caption(state: &AppState, image_name: &str) -> anyhow::Result<Option<Caption>> {
    let record_name = caption_object_name(image_name);
    let names = state.store.list_names(&state.bucket).await?;
    if !names.iter().any(|n| *n == record_name) {
        return Ok(None);
    }

    let record = ScratchFile::reserve(&state.scratch_dir, &record_name);
    state
        .store
        .download(&state.bucket, &record_name, record.path())
        .await?;
    let bytes = fs::read(record.path()).await?;
    Ok(Some(Caption::from_record(&bytes)?))
}

/// `GET /files/{name}` — stream the object with a content type guessed from
/// its extension.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    validate_object_name(&name).map_err(AppError::bad_request)?;

    let scratch = ScratchFile::reserve(&state.scratch_dir, &name);
    state
        .store
        .download(&state.bucket, &name, scratch.path())
        .await?;

    let file = File::open(scratch.path()).await?;
    let length = file.metadata().await?.len();

    // The scratch file is removed once the body has been fully sent.
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _guard = &scratch;
        chunk
    });

    let content_type = guess_content_type(&name).unwrap_or("application/octet-stream");
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    Ok(response)
}

/// `GET /version`
pub async fn version(State(state): State<AppState>) -> String {
    format!(
        "{} {} (background: {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        state.background_color
    )
}
