//! The offline cache & push worker.
//!
//! [`OfflineWorker`] holds one configuration version and the runtime
//! capabilities it talks to. Each `handle_*` method is one event handler;
//! the [`crate::host::WorkerHost`] decides when they run.

mod builder;

pub use builder::OfflineWorkerBuilder;

use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{BucketMeta, CacheStorage};
use crate::clients::ClientRegistry;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::lifecycle::{Activity, Lifecycle, WorkerState};
use crate::network::Fetcher;
use crate::notifications::{ClickKind, ClickOutcome, NotificationClick, NotificationSurface};
use crate::push::{build_notification, NotificationDescriptor, PushMessage};
use crate::request::{WorkerRequest, WorkerResponse};
use crate::strategy::{cache_first, network_first, FetchResult, Route, Router, StrategyContext};

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallReport {
    pub version: String,
    pub bucket: String,
    /// Number of precached entries.
    pub cached: usize,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateReport {
    /// Buckets of earlier versions that were deleted.
    pub deleted: Vec<String>,
}

/// What the sync handler did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    Completed,
    /// The tag is not one this worker syncs.
    Ignored,
}

/// Snapshot of a worker for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub version: String,
    pub state: WorkerState,
    pub activity: Activity,
    pub buckets: Vec<BucketMeta>,
}

/// One version of the worker.
pub struct OfflineWorker {
    config: Arc<WorkerConfig>,
    router: Router,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    precache_fetcher: Arc<dyn Fetcher>,
    clients: Arc<dyn ClientRegistry>,
    notifications: Arc<dyn NotificationSurface>,
    lifecycle: Lifecycle,
}

impl OfflineWorker {
    /// Create a builder for configuring the worker.
    pub fn builder(config: WorkerConfig) -> OfflineWorkerBuilder {
        OfflineWorkerBuilder::new(config)
    }

    pub fn config(&self) -> &Arc<WorkerConfig> {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn clients(&self) -> &Arc<dyn ClientRegistry> {
        &self.clients
    }

    /// Classify a request without handling it.
    pub fn classify(&self, request: &WorkerRequest) -> Route {
        self.router.classify(request)
    }

    pub fn status(&self) -> Result<WorkerStatus> {
        Ok(WorkerStatus {
            version: self.config.version.clone(),
            state: self.lifecycle.state(),
            activity: self.lifecycle.activity(),
            buckets: self.storage.stats()?,
        })
    }

    // ========================================
    // Lifecycle handlers
    // ========================================

    /// Fetch every precache URL and store them all in the static bucket.
    ///
    /// Nothing is written unless every fetch succeeds with a 2xx status. On
    /// success the worker asks to skip waiting unless configured to wait.
    pub async fn install(&self) -> Result<InstallReport> {
        let bucket = self.config.static_bucket();
        info!("Installing worker {} into {}", self.config.version, bucket);

        let urls = self
            .config
            .precache
            .iter()
            .map(|raw| self.config.resolve(raw))
            .collect::<Result<Vec<_>>>()?;

        let entries = try_join_all(urls.iter().map(|url| self.precache_one(url))).await?;

        self.storage.open(&bucket)?;
        self.storage.put_all(&bucket, &entries)?;
        if self.config.skip_waiting {
            self.lifecycle.request_skip_waiting();
        }

        info!("Precached {} entries", entries.len());
        Ok(InstallReport {
            version: self.config.version.clone(),
            bucket,
            cached: entries.len(),
        })
    }

    async fn precache_one(&self, url: &Url) -> Result<(String, WorkerResponse)> {
        let request = WorkerRequest::get(url.clone());
        let response = self
            .precache_fetcher
            .fetch(&request)
            .await
            .map_err(|e| WorkerError::InstallFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(WorkerError::InstallFailed {
                url: url.to_string(),
                message: format!("HTTP {}", response.status),
            });
        }

        Ok((request.cache_key(), response))
    }

    /// Delete every bucket that does not belong to this version.
    pub async fn activate(&self) -> Result<ActivateReport> {
        info!("Activating worker {}", self.config.version);

        let mut report = ActivateReport::default();
        for name in self.storage.bucket_names()? {
            if self.config.is_current_bucket(&name) {
                continue;
            }
            if self.storage.delete_bucket(&name)? {
                info!("Deleting old cache: {}", name);
                report.deleted.push(name);
            }
        }
        Ok(report)
    }

    /// Take control of every open window.
    pub async fn claim_clients(&self) -> Result<usize> {
        let claimed = self.clients.claim().await?;
        debug!("Claimed {} client(s)", claimed);
        Ok(claimed)
    }

    // ========================================
    // Functional handlers
    // ========================================

    /// Answer an intercepted request.
    pub async fn handle_fetch(&self, request: &WorkerRequest) -> Result<FetchResult> {
        let _event = self.lifecycle.begin_event();
        let ctx = StrategyContext {
            config: &self.config,
            storage: self.storage.as_ref(),
            fetcher: self.fetcher.as_ref(),
        };

        let handled = match self.router.classify(request) {
            Route::Bypass => return Ok(FetchResult::Passthrough),
            Route::NetworkFirst => network_first(&ctx, request).await?,
            Route::CacheFirst => cache_first(&ctx, request).await?,
        };
        Ok(FetchResult::Respond(handled))
    }

    /// Show the notification for a push message.
    ///
    /// Resolves once the surface has displayed it.
    pub async fn handle_push(&self, message: &PushMessage) -> Result<NotificationDescriptor> {
        let _event = self.lifecycle.begin_event();
        let notification = build_notification(&self.config.notification, message);
        self.notifications.show(&notification).await?;
        Ok(notification)
    }

    /// Close the clicked notification and focus or open the app.
    pub async fn handle_notification_click(&self, click: &NotificationClick) -> Result<ClickOutcome> {
        let _event = self.lifecycle.begin_event();
        self.notifications.close(&click.tag).await?;

        match click.kind() {
            ClickKind::Open => self.focus_or_open().await,
            ClickKind::Dismiss => Ok(ClickOutcome::Dismissed),
            ClickKind::Unknown => {
                debug!("Ignoring notification action {:?}", click.action);
                Ok(ClickOutcome::Ignored)
            }
        }
    }

    async fn focus_or_open(&self) -> Result<ClickOutcome> {
        let app_origin = self.config.client_origin.origin();
        let windows = self.clients.match_all().await?;

        if let Some(window) = windows.iter().find(|w| w.url.origin() == app_origin) {
            let focused = self.clients.focus(&window.id).await?;
            return Ok(ClickOutcome::Focused {
                client_id: focused.id,
            });
        }

        let opened = self
            .clients
            .open_window(&self.config.fallback_window_url)
            .await?;
        Ok(ClickOutcome::Opened {
            client_id: opened.id,
            url: opened.url.to_string(),
        })
    }

    /// Background sync hook. The configured tag completes without work.
    pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome> {
        let _event = self.lifecycle.begin_event();
        if tag == self.config.sync_tag {
            info!("Background sync triggered");
            Ok(SyncOutcome::Completed)
        } else {
            warn!("Ignoring sync with unknown tag: {}", tag);
            Ok(SyncOutcome::Ignored)
        }
    }
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("version", &self.config.version)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}
