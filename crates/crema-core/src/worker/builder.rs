//! Builder for configuring an [`OfflineWorker`].

use std::sync::Arc;

use super::OfflineWorker;
use crate::cache::{CacheStorage, MemoryCacheStorage};
use crate::clients::{ClientRegistry, MemoryClientRegistry};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::network::{Fetcher, HttpFetcher};
use crate::notifications::{LogNotificationSurface, NotificationSurface};
use crate::strategy::Router;

/// Builder for an [`OfflineWorker`].
///
/// Capabilities that are not supplied fall back to in-process defaults:
/// memory buckets, a reqwest fetcher with the configured timeout, an empty
/// window registry, and log-only notifications.
///
/// # Example
///
/// ```rust,ignore
/// use crema_core::{OfflineWorker, SqliteCacheStorage, WorkerConfig};
///
/// let worker = OfflineWorker::builder(WorkerConfig::load("worker.json")?)
///     .storage(Arc::new(SqliteCacheStorage::new("cache.sqlite")?))
///     .build()?;
/// ```
pub struct OfflineWorkerBuilder {
    config: WorkerConfig,
    storage: Option<Arc<dyn CacheStorage>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    precache_fetcher: Option<Arc<dyn Fetcher>>,
    clients: Option<Arc<dyn ClientRegistry>>,
    notifications: Option<Arc<dyn NotificationSurface>>,
}

impl OfflineWorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            storage: None,
            fetcher: None,
            precache_fetcher: None,
            clients: None,
            notifications: None,
        }
    }

    /// Cache bucket backend.
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Network used for live fetches, and for precaching unless
    /// [`precache_fetcher`](Self::precache_fetcher) is set.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Network used only by install.
    ///
    /// Precached entries must be final responses, so this one should follow
    /// redirects even when live fetches hand 3xx back to the runtime.
    pub fn precache_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.precache_fetcher = Some(fetcher);
        self
    }

    /// Window registry used by notification clicks and `claim`.
    pub fn clients(mut self, clients: Arc<dyn ClientRegistry>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Surface push notifications are shown on.
    pub fn notifications(mut self, notifications: Arc<dyn NotificationSurface>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Validate the configuration and assemble the worker.
    pub fn build(self) -> Result<OfflineWorker> {
        self.config.validate()?;
        let router = Router::new(&self.config)?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::with_options(self.config.request_timeout(), true)?),
        };

        let precache_fetcher = self.precache_fetcher.unwrap_or_else(|| fetcher.clone());

        Ok(OfflineWorker {
            config: Arc::new(self.config),
            router,
            storage: self
                .storage
                .unwrap_or_else(|| Arc::new(MemoryCacheStorage::new())),
            fetcher,
            precache_fetcher,
            clients: self
                .clients
                .unwrap_or_else(|| Arc::new(MemoryClientRegistry::new())),
            notifications: self
                .notifications
                .unwrap_or_else(|| Arc::new(LogNotificationSurface)),
            lifecycle: Lifecycle::new(),
        })
    }
}
