//! HTTP server implementation using Axum.

use crate::handler::{
    handle_activate_waiting, handle_attach_client, handle_fetch, handle_health,
    handle_list_clients, handle_notification_click, handle_notifications, handle_push,
    handle_status, handle_sync,
};
use axum::{
    routing::{get, post},
    Router,
};
use crema_core::{
    CacheStorage, HttpFetcher, MemoryClientRegistry, MemoryNotificationSurface, NetworkConfig,
    OfflineWorker, RegistrationReport, RetryConfig, WorkerConfig, WorkerHost,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    /// Hosts the active worker version
    pub host: WorkerHost,
    /// Live network, shared with the worker and used for pass-through requests.
    /// Redirects are handed back to the browser.
    pub fetcher: Arc<HttpFetcher>,
    /// Redirect-following network for install-time precaching
    pub precache_fetcher: Arc<HttpFetcher>,
    /// Persistent cache buckets
    pub storage: Arc<dyn CacheStorage>,
    /// Client windows registered through the control routes
    pub clients: Arc<MemoryClientRegistry>,
    /// Notifications shown by push events
    pub notifications: Arc<MemoryNotificationSurface>,
    /// Configuration new worker versions are built from
    pub config: Arc<WorkerConfig>,
}

impl AppState {
    /// Create the shared state. No worker is registered yet.
    pub fn new(config: WorkerConfig, storage: Arc<dyn CacheStorage>) -> anyhow::Result<Self> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::with_options(config.request_timeout(), false)?);
        let precache_fetcher = Arc::new(HttpFetcher::with_options(config.request_timeout(), true)?);
        let retry = RetryConfig::new()
            .with_max_attempts(NetworkConfig::INSTALL_RETRY_ATTEMPTS)
            .with_base_delay(Duration::from_secs(1));

        Ok(Self {
            host: WorkerHost::new().with_retry(retry),
            fetcher,
            precache_fetcher,
            storage,
            clients: Arc::new(MemoryClientRegistry::new()),
            notifications: Arc::new(MemoryNotificationSurface::new()),
            config: Arc::new(config),
        })
    }

    /// Build a worker wired to this state's capabilities.
    pub fn build_worker(&self) -> crema_core::Result<OfflineWorker> {
        OfflineWorker::builder(self.config.as_ref().clone())
            .storage(self.storage.clone())
            .fetcher(self.fetcher.clone())
            .precache_fetcher(self.precache_fetcher.clone())
            .clients(self.clients.clone())
            .notifications(self.notifications.clone())
            .build()
    }

    /// Install and activate the configured worker version, retrying on
    /// network failures.
    pub async fn install(&self) -> crema_core::Result<RegistrationReport> {
        let (result, stats) = self.host.register_with_retry(|| self.build_worker()).await;
        match &result {
            Ok(report) => info!(
                "Worker {} active after {} attempt(s), {} entries precached",
                report.version, stats.attempts, report.install.cached
            ),
            Err(e) => error!("Worker install failed after {} attempt(s): {}", stats.attempts, e),
        }
        result
    }
}

/// Build the router: control routes under `/__worker`, every other request
/// is a fetch event.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Configure CORS for the control routes
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__worker/health", get(handle_health))
        .route("/__worker/status", get(handle_status))
        .route("/__worker/push", post(handle_push))
        .route("/__worker/notificationclick", post(handle_notification_click))
        .route("/__worker/sync", post(handle_sync))
        .route("/__worker/activate", post(handle_activate_waiting))
        .route("/__worker/notifications", get(handle_notifications))
        .route(
            "/__worker/clients",
            get(handle_list_clients).post(handle_attach_client),
        )
        .fallback(handle_fetch)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the proxy HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crema_core::SqliteCacheStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_starts() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(SqliteCacheStorage::new(temp_dir.path().join("cache.sqlite")).unwrap());
        let state = Arc::new(AppState::new(WorkerConfig::default(), storage).unwrap());

        let addr = start_server(state, "127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
    }

    #[test]
    fn test_build_worker_uses_shared_config() {
        let state = AppState::new(WorkerConfig::default().with_version("v9.9.9"), Arc::new(crema_core::MemoryCacheStorage::new())).unwrap();
        let worker = state.build_worker().unwrap();
        assert_eq!(worker.version(), "v9.9.9");
    }
}
