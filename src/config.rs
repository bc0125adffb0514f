use crate::models::file_record::{ID_LEN, MAX_FILE_NAME_LEN, MAX_URL_LEN};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

const IN_MEMORY_DATABASE_URL: &str = "sqlite::memory:";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Longest bucket name for which `{bucket}/{id}/{file_name}` still fits the
/// `url` column.
pub const MAX_BUCKET_NAME_LEN: usize = MAX_URL_LEN - ID_LEN - 2 - MAX_FILE_NAME_LEN;

/// Where uploaded file bytes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    /// Local directory (`storage_dir/{bucket}`).
    Local,
    /// Amazon S3 bucket, credentials taken from the `AWS_*` environment.
    S3,
    /// Process memory; contents vanish on exit.
    Memory,
}

impl FromStr for BlobBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown blob backend `{}` (expected local, s3 or memory)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub bucket_name: String,
    pub blob_backend: BlobBackend,
    pub storage_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub metrics_endpoint: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File metadata service")]
pub struct Args {
    /// Host to bind to (overrides FILE_SERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_SERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides FILE_SERVICE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket that holds uploaded files (overrides FILE_SERVICE_BUCKET_NAME)
    #[arg(long)]
    pub bucket_name: Option<String>,

    /// Blob backend: local, s3 or memory (overrides FILE_SERVICE_BLOB_BACKEND)
    #[arg(long)]
    pub blob_backend: Option<BlobBackend>,

    /// Root directory for the local blob backend (overrides FILE_SERVICE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Largest accepted upload body in bytes (overrides FILE_SERVICE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// OTLP endpoint for metrics (overrides FILE_SERVICE_METRICS_ENDPOINT)
    #[arg(long)]
    pub metrics_endpoint: Option<String>,

    /// Write JSON logs to this file instead of stdout (overrides FILE_SERVICE_LOG_FILE)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("FILE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("FILE_SERVICE_PORT")?.unwrap_or(3000);
        let env_db = env::var("FILE_SERVICE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/file_service.db".into());
        let env_bucket = env::var("FILE_SERVICE_BUCKET_NAME").unwrap_or_else(|_| "files".into());
        let env_backend = parse_env("FILE_SERVICE_BLOB_BACKEND")?.unwrap_or(BlobBackend::Local);
        let env_storage = env::var("FILE_SERVICE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/objects"));
        let env_max_upload =
            parse_env("FILE_SERVICE_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let env_metrics = env::var("FILE_SERVICE_METRICS_ENDPOINT").ok();
        let env_log_file = env::var("FILE_SERVICE_LOG_FILE").ok().map(PathBuf::from);

        // --- Merge ---
        let mut cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            bucket_name: args.bucket_name.unwrap_or(env_bucket),
            blob_backend: args.blob_backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            metrics_endpoint: args.metrics_endpoint.or(env_metrics),
            log_file: args.log_file.or(env_log_file),
        };

        if testing_enabled() {
            cfg.database_url = IN_MEMORY_DATABASE_URL.into();
            cfg.blob_backend = BlobBackend::Memory;
        }

        if cfg.bucket_name.is_empty() || cfg.bucket_name.contains('/') {
            bail!("bucket name `{}` must be non-empty and contain no `/`", cfg.bucket_name);
        }
        if cfg.bucket_name.len() > MAX_BUCKET_NAME_LEN {
            bail!(
                "bucket name is {} bytes; at most {} fit in a file url",
                cfg.bucket_name.len(),
                MAX_BUCKET_NAME_LEN
            );
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when the metadata database lives only in process memory.
    pub fn is_in_memory_database(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

/// `TESTING=True` swaps both stores for ephemeral in-process instances.
fn testing_enabled() -> bool {
    env::var("TESTING")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
