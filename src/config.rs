use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, path::PathBuf};

pub const DEFAULT_BUCKET: &str = "my-flask-gcs-app-uploads";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Which blob store implementation backs the bucket.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "gcs" => Ok(Self::Gcs),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown storage backend `{}` (expected gcs, local or memory)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bucket_name: String,
    pub background_color: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub captioning_enabled: bool,
    pub storage_backend: StorageBackend,
    pub gcs_endpoint: String,
    pub gcs_access_token: Option<String>,
    pub storage_dir: String,
    pub database_url: String,
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: usize,
}

// Secrets never reach the logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bucket_name", &self.bucket_name)
            .field("background_color", &self.background_color)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("captioning_enabled", &self.captioning_enabled)
            .field("storage_backend", &self.storage_backend)
            .field("gcs_endpoint", &self.gcs_endpoint)
            .field(
                "gcs_access_token",
                &self.gcs_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("scratch_dir", &self.scratch_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Image gallery with AI-generated captions")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket holding images and caption records (overrides BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Page background color (overrides COLOR)
    #[arg(long)]
    pub color: Option<String>,

    /// Gemini model used for captions (overrides GEMINI_MODEL)
    #[arg(long)]
    pub gemini_model: Option<String>,

    /// Disable caption generation and the /view route
    #[arg(long)]
    pub no_captioning: bool,

    /// Blob store implementation (overrides STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub storage_backend: Option<StorageBackend>,

    /// Directory for the local backend's payloads (overrides STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// SQLite URL for the local backend's metadata (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for per-request scratch files (overrides SCRATCH_DIR)
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Apply the local backend schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_lookup(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values produced by `lookup`, then over defaults.
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let env_port = match var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 8080,
        };
        let env_captioning = match var("CAPTIONING_ENABLED") {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("parsing CAPTIONING_ENABLED value `{}`", value))?,
            None => true,
        };
        let env_backend = match var("STORAGE_BACKEND") {
            Some(value) => StorageBackend::parse(&value)
                .with_context(|| format!("parsing STORAGE_BACKEND value `{}`", value))?,
            None => StorageBackend::Gcs,
        };
        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing MAX_UPLOAD_BYTES value `{}`", value))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| var("HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            bucket_name: args
                .bucket
                .or_else(|| var("BUCKET_NAME"))
                .unwrap_or_else(|| DEFAULT_BUCKET.into()),
            background_color: args
                .color
                .or_else(|| var("COLOR"))
                .unwrap_or_else(|| "blue".into()),
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: args
                .gemini_model
                .or_else(|| var("GEMINI_MODEL"))
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            gemini_base_url: var("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into()),
            captioning_enabled: !args.no_captioning && env_captioning,
            storage_backend: args.storage_backend.unwrap_or(env_backend),
            gcs_endpoint: var("GCS_ENDPOINT").unwrap_or_else(|| DEFAULT_GCS_ENDPOINT.into()),
            gcs_access_token: var("GCS_ACCESS_TOKEN"),
            storage_dir: args
                .storage_dir
                .or_else(|| var("STORAGE_DIR"))
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .or_else(|| var("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/gallery.db".into()),
            scratch_dir: args
                .scratch_dir
                .or_else(|| var("SCRATCH_DIR").map(PathBuf::from))
                .unwrap_or_else(env::temp_dir),
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("`{}` is not a boolean", other),
    }
}
