use crate::{client::ClientError, models::bucket::BucketType};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};
use thiserror::Error;

/// Adapter construction settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// Bucket name. Falls back to the bucket the credentials are restricted to.
    pub bucket: Option<String>,

    /// Root prefix for every path. Falls back to the credentials' name
    /// prefix, then to the bucket root.
    pub prefix: Option<String>,

    /// Stream reads straight from the store instead of buffering them.
    pub stream_reads: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: None,
            stream_reads: true,
        }
    }
}

impl AdapterConfig {
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no bucket configured and the credentials are not restricted to one")]
    BucketRequired,
    #[error("bucket `{bucket}` is outside the credentials' restriction to `{allowed}`")]
    BucketOutsideRestriction { bucket: String, allowed: String },
    #[error("invalid path prefix `{0}`")]
    InvalidPrefix(String),
    #[error("unable to resolve bucket `{bucket}`")]
    BucketLookup {
        bucket: String,
        #[source]
        source: ClientError,
    },
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base of generated download URLs.
    pub public_url: String,
    pub bucket: String,
    pub bucket_type: BucketType,
    pub adapter: AdapterConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Filesystem adapter over a B2-style object store")]
pub struct Args {
    /// Host to bind to (overrides B2_ADAPTER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides B2_ADAPTER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides B2_ADAPTER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides B2_ADAPTER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL used in download links (overrides B2_ADAPTER_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Bucket to operate on (overrides B2_ADAPTER_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket visibility when it has to be created: public or private
    /// (overrides B2_ADAPTER_BUCKET_TYPE)
    #[arg(long)]
    pub bucket_type: Option<String>,

    /// Root prefix for all paths (overrides B2_ADAPTER_PREFIX)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Buffer whole objects on read instead of streaming them
    #[arg(long)]
    pub buffer_reads: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve downloads and health endpoints (default)
    Serve,
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
        #[arg(long, short)]
        recursive: bool,
    },
    /// Upload a local file
    Put { path: String, file: PathBuf },
    /// Print a file to stdout
    Cat { path: String },
    /// Delete a file
    Rm { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// Print a download URL
    Url {
        path: String,
        /// Validity in seconds, required for private buckets
        #[arg(long)]
        valid_for: Option<u64>,
    },
    /// Print the stored checksum of a file
    Checksum {
        path: String,
        #[arg(long)]
        algorithm: Option<String>,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig, the migrate
    /// flag and the requested command.
    pub fn from_env_and_args() -> Result<(Self, bool, Command)> {
        let args = Args::parse();

        let env_host = env::var("B2_ADAPTER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("B2_ADAPTER_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing B2_ADAPTER_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading B2_ADAPTER_PORT"),
        };
        let env_storage =
            env::var("B2_ADAPTER_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("B2_ADAPTER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/b2_adapter.db".into());
        let env_bucket = env::var("B2_ADAPTER_BUCKET").unwrap_or_else(|_| "local-bucket".into());
        let env_prefix = env::var("B2_ADAPTER_PREFIX").ok();
        let env_bucket_type =
            env::var("B2_ADAPTER_BUCKET_TYPE").unwrap_or_else(|_| "allPrivate".into());

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_url = match args.public_url.or_else(|| env::var("B2_ADAPTER_PUBLIC_URL").ok()) {
            Some(url) => url,
            None => format!("http://127.0.0.1:{}", port),
        };
        let bucket_type_raw = args.bucket_type.unwrap_or(env_bucket_type);
        let bucket_type = bucket_type_raw
            .parse::<BucketType>()
            .map_err(anyhow::Error::msg)
            .context("parsing bucket type")?;
        let bucket = args.bucket.unwrap_or(env_bucket);

        let cfg = Self {
            host,
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: public_url.trim_end_matches('/').to_string(),
            adapter: AdapterConfig {
                bucket: Some(bucket.clone()),
                prefix: args.prefix.or(env_prefix),
                stream_reads: !args.buffer_reads,
            },
            bucket,
            bucket_type,
        };

        Ok((cfg, args.migrate, args.command.unwrap_or(Command::Serve)))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
