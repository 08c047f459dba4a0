use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod pages;
mod routes;
mod services;
mod state;

use config::{AppConfig, StorageBackend};
use services::{
    blob_store::SharedBlobStore, captioner::GeminiCaptioner, gcs_store::GcsBlobStore,
    local_store::LocalBlobStore, memory_store::MemoryBlobStore,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting caption-gallery with config: {:?}", cfg);

    // --- Migration mode: apply the local schema and exit ---
    if migrate {
        let store = open_local_store(&cfg).await?;
        store.migrate().await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Scratch directory for per-request files ---
    if !cfg.scratch_dir.exists() {
        fs::create_dir_all(&cfg.scratch_dir)?;
        tracing::info!("Created scratch directory at {}", cfg.scratch_dir.display());
    }

    // --- Blob store, built once and shared by every request ---
    let store: SharedBlobStore = match cfg.storage_backend {
        StorageBackend::Gcs => Arc::new(GcsBlobStore::new(
            &cfg.gcs_endpoint,
            cfg.gcs_access_token.clone(),
        )?),
        StorageBackend::Local => {
            let store = open_local_store(&cfg).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory backend; uploads are lost on restart");
            Arc::new(MemoryBlobStore::new())
        }
    };

    let captioner = Arc::new(GeminiCaptioner::new(
        cfg.gemini_api_key.clone(),
        cfg.gemini_model.clone(),
        cfg.gemini_base_url.clone(),
    ));

    let state = AppState {
        store,
        captioner,
        bucket: cfg.bucket_name.clone(),
        scratch_dir: cfg.scratch_dir.clone(),
        background_color: cfg.background_color.clone(),
        captioning_enabled: cfg.captioning_enabled,
    };

    // --- Build router ---
    let app: Router =
        routes::routes::routes(cfg.captioning_enabled, cfg.max_upload_bytes).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Prepare directories and the SQLite pool for the local backend.
async fn open_local_store(cfg: &AppConfig) -> Result<LocalBlobStore> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if db_path != ":memory:" {
        let db_path_obj = Path::new(db_path);
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        // SQLx will not create the database file itself.
        if let Err(e) = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path_obj)
        {
            tracing::warn!("Failed to open database file manually: {}", e);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    Ok(LocalBlobStore::new(db, cfg.storage_dir.clone()))
}
