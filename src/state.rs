use crate::services::{blob_store::SharedBlobStore, captioner::SharedCaptioner};
use std::path::PathBuf;

/// Shared state handed to every handler.
///
/// The store and captioner are built once at startup; cloning the state only
/// bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedBlobStore,
    pub captioner: SharedCaptioner,
    pub bucket: String,
    pub scratch_dir: PathBuf,
    pub background_color: String,
    pub captioning_enabled: bool,
}
