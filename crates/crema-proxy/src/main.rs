//! Crema Proxy - HTTP runtime for the offline cache & push worker.
//!
//! Serves the portal through the worker: cached responses when the upstream
//! is unreachable, live ones otherwise.

use anyhow::{Context, Result};
use clap::Parser;
use crema_core::{SqliteCacheStorage, WorkerConfig};
use crema_proxy::{start_server, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "crema-proxy")]
#[command(about = "Offline cache & push worker proxy for the Mikel Coffee portal")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Upstream origin to proxy (overrides the config file's origin)
    #[arg(short, long)]
    upstream: Option<Url>,

    /// Worker configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database for cache buckets (defaults to the user cache directory)
    #[arg(long)]
    cache_db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; RUST_LOG takes precedence over --debug
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .compact();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
        builder.with_max_level(log_level).init();
    }

    info!("Starting Crema Proxy");

    let mut config = match &args.config {
        Some(path) => WorkerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => WorkerConfig::default(),
    };
    if let Some(upstream) = args.upstream {
        config = config.with_origin(upstream);
    }

    let cache_db = args.cache_db.unwrap_or_else(default_cache_db);
    info!("Worker {} for {}", config.version, config.origin);
    info!("Cache database: {}", cache_db.display());

    let storage = Arc::new(SqliteCacheStorage::new(&cache_db)?);
    let state = Arc::new(AppState::new(config, storage)?);

    // Without an active worker every request passes straight through
    if let Err(e) = state.install().await {
        warn!("Serving without an active worker: {}", e);
    }

    let addr = start_server(state.clone(), &args.host, args.port).await?;
    info!("Proxy running on http://{}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, finishing pending events");
    state.host.shutdown().await;

    Ok(())
}

fn default_cache_db() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("crema"))
        .unwrap_or_else(|| PathBuf::from(".crema"))
        .join("cache.sqlite")
}
