//! Health & readiness handlers.
//!
//! - GET /health  -> liveness, always "OK"
//! - GET /readyz  -> readiness that checks the bucket and the scratch directory

use crate::{services::scratch::ScratchFile, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;

/// `GET /health`
///
/// Never touches the bucket or the caption service.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// `GET /readyz`
///
/// 1. Lists the configured bucket.
/// 2. Writes, reads back and removes a scratch file.
///
/// HTTP 200 when both pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let storage_check = match state.store.list_names(&state.bucket).await {
        Ok(_) => (true, None::<String>),
        Err(e) => (false, Some(e.to_string())),
    };

    let check_file = ScratchFile::reserve(&state.scratch_dir, ".readyz");
    let scratch_check = match fs::write(check_file.path(), b"readyz").await {
        Ok(_) => match fs::read(check_file.path()).await {
            Ok(bytes) if bytes == b"readyz" => (true, None::<String>),
            Ok(_) => (false, Some("file content mismatch".to_string())),
            Err(e) => (false, Some(format!("could not read scratch file: {}", e))),
        },
        Err(e) => (false, Some(format!("could not write scratch file: {}", e))),
    };
    drop(check_file);

    let overall_ok = storage_check.0 && scratch_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "storage",
        CheckStatus {
            ok: storage_check.0,
            error: storage_check.1,
        },
    );
    checks.insert(
        "scratch",
        CheckStatus {
            ok: scratch_check.0,
            error: scratch_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
