//! `POST /upload`: store the image, then (optionally) caption it.

use crate::{
    errors::AppError,
    models::object::{caption_object_name, guess_content_type, is_jpeg_name, validate_object_name},
    services::scratch::ScratchFile,
    state::AppState,
};
use anyhow::Context;
use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::path::Path;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};

pub const UPLOAD_FIELD: &str = "form_file";

struct StagedUpload {
    name: String,
    content_type: Option<String>,
    file: ScratchFile,
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// Receives the `form_file` part, stages it in a scratch file, uploads it
/// under the client's file name and redirects back to the gallery.
///
/// Caption failures never fail the upload.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let staged = stage_upload(&state, multipart).await?;

    state
        .store
        .upload(
            &state.bucket,
            staged.file.path(),
            &staged.name,
            staged.content_type.as_deref(),
        )
        .await?;
    info!(name = %staged.name, bucket = %state.bucket, "stored image");

    // Only JPEGs get a `<base>.json` record; `notes.json` would be its own record.
    if state.captioning_enabled && is_jpeg_name(&staged.name) {
        if let Err(err) = store_caption(&state, &staged.name, staged.file.path()).await {
            warn!(name = %staged.name, "caption not stored: {:#}", err);
        }
    } else if state.captioning_enabled {
        debug!(name = %staged.name, "not a JPEG; skipping caption");
    }

    Ok((StatusCode::FOUND, [(header::LOCATION, "/")]).into_response())
}

async fn stage_upload(state: &AppState, mut multipart: Multipart) -> Result<StagedUpload, AppError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(AppError::bad_request("No selected file"));
        }
        validate_object_name(&name).map_err(AppError::bad_request)?;

        let content_type = field
            .content_type()
            .filter(|ct| *ct != "application/octet-stream")
            .map(str::to_string)
            .or_else(|| guess_content_type(&name).map(str::to_string));

        let scratch = ScratchFile::reserve(&state.scratch_dir, &name);
        let mut file = File::create(scratch.path()).await?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        return Ok(StagedUpload {
            name,
            content_type,
            file: scratch,
        });
    }

    Err(AppError::bad_request("No file part in request"))
}

/// Generate a caption for the staged image and upload it as `<base>.json`.
async fn store_caption(state: &AppState, image_name: &str, image_path: &Path) -> anyhow::Result<()> {
    let caption = state.captioner.generate_caption(image_path).await;
    let record_name = caption_object_name(image_name);

    let record = ScratchFile::reserve(&state.scratch_dir, &record_name);
    fs::write(record.path(), caption.to_record()?)
        .await
        .context("writing caption record")?;
    state
        .store
        .upload(
            &state.bucket,
            record.path(),
            &record_name,
            Some("application/json"),
        )
        .await
        .with_context(|| format!("uploading {}", record_name))?;

    info!(name = %record_name, title = %caption.title, "stored caption record");
    Ok(())
}
