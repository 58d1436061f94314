use anyhow::{Context, Result};
use axum::Router;
use b2_adapter::{
    B2Adapter, LocalObjectStore,
    config::{AppConfig, Command},
    models::{
        attributes::StorageAttributes,
        options::{ChecksumOptions, PublicUrlOptions, WriteOptions},
    },
    routes,
};
use futures::{StreamExt, TryStreamExt};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpListener};
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + migrate flag + command ---
    let (cfg, migrate, command) = AppConfig::from_env_and_args()?;

    tracing::debug!("Starting b2-adapter with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    let db_path_obj = Path::new(db_path);
    if let Some(parent) = db_path_obj.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    if !db_url.contains(":memory:") {
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
        {
            Ok(_) => tracing::debug!("Database file {} is writable.", db_path),
            Err(e) => tracing::warn!("Failed to open database file {}: {}", db_path, e),
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    let store = LocalObjectStore::new(db, cfg.storage_dir.clone(), cfg.public_url.clone());

    // --- Schema is idempotent; --migrate exits after applying it ---
    store.migrate().await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    let bucket = store.ensure_bucket(&cfg.bucket, cfg.bucket_type).await?;
    tracing::debug!("Using bucket {} ({})", bucket.name, bucket.id);

    let adapter = B2Adapter::connect(Arc::new(store.clone()), cfg.adapter.clone()).await?;

    match command {
        Command::Serve => serve(&cfg, store).await,
        Command::Ls { path, recursive } => {
            let mut entries = adapter.list_contents(&path, recursive);
            while let Some(entry) = entries.try_next().await? {
                let size = match &entry {
                    StorageAttributes::File(file) => {
                        file.file_size.map(|s| s.to_string()).unwrap_or_default()
                    }
                    StorageAttributes::Dir(_) => "-".to_string(),
                };
                let (kind, suffix) = if entry.is_dir() { ("d", "/") } else { ("f", "") };
                println!("{} {:>12} {}{}", kind, size, entry.path(), suffix);
            }
            Ok(())
        }
        Command::Put { path, file } => {
            let local = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            adapter
                .write_stream(&path, ReaderStream::new(local).boxed(), WriteOptions::default())
                .await?;
            tracing::info!("Uploaded {} to {}", file.display(), path);
            Ok(())
        }
        Command::Cat { path } => {
            let mut body = adapter.read_stream(&path).await?;
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = body.try_next().await? {
                stdout.write_all(&chunk).await?;
            }
            stdout.flush().await?;
            Ok(())
        }
        Command::Rm { path } => Ok(adapter.delete(&path).await?),
        Command::Mkdir { path } => Ok(adapter.create_directory(&path).await?),
        Command::Url { path, valid_for } => {
            let options = PublicUrlOptions {
                valid_for: valid_for.map(Duration::from_secs),
            };
            println!("{}", adapter.public_url(&path, options).await?);
            Ok(())
        }
        Command::Checksum { path, algorithm } => {
            let options = ChecksumOptions { algorithm };
            println!("{}", adapter.checksum(&path, options).await?);
            Ok(())
        }
    }
}

/// Serve downloads and health endpoints until the process is stopped.
async fn serve(cfg: &AppConfig, store: LocalObjectStore) -> Result<()> {
    let app: Router = routes::routes::routes().with_state(store);

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
