//! Crema Core - offline cache & push worker for the Mikel Coffee portal.
//!
//! The worker precaches the app shell on install, prunes old cache versions
//! on activate, answers intercepted requests network-first or cache-first,
//! and turns push messages into notifications. Runtime capabilities (network,
//! cache buckets, client windows, notification display) are traits so the
//! same worker runs behind the `crema-proxy` HTTP adapter or in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crema_core::{OfflineWorker, WorkerConfig, WorkerEvent, WorkerHost, WorkerRequest};
//!
//! #[tokio::main]
//! async fn main() -> crema_core::Result<()> {
//!     let host = WorkerHost::new();
//!     let worker = OfflineWorker::builder(WorkerConfig::default()).build()?;
//!     host.register(Arc::new(worker)).await?;
//!
//!     let url = "https://employee-hub-45.preview.emergentagent.com/api/menu".parse().unwrap();
//!     let outcome = host.dispatch(WorkerEvent::Fetch(WorkerRequest::get(url))).await?;
//!     println!("{:?}", outcome);
//!
//!     host.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod network;
pub mod notifications;
pub mod push;
pub mod request;
pub mod strategy;
pub mod worker;

// Re-export commonly used types
pub use cache::{
    limit_bucket_size, BucketMeta, CacheEntry, CacheStorage, MemoryCacheStorage, SqliteCacheStorage,
};
pub use clients::{ClientRegistry, MemoryClientRegistry, WindowClient};
pub use config::{AppConfig, CacheDefaults, NetworkConfig, NotificationConfig, WorkerConfig};
pub use dispatch::{Dispatcher, EventHandler, EventKind, EventOutcome, HandlerFuture, WorkerEvent};
pub use error::{Result, WorkerError};
pub use host::{RegistrationReport, WaitUntil, WorkerHost};
pub use lifecycle::{Activity, Lifecycle, WorkerState};
pub use network::{Fetcher, HttpFetcher, RetryConfig};
pub use notifications::{
    ClickKind, ClickOutcome, LogNotificationSurface, MemoryNotificationSurface, NotificationClick,
    NotificationSurface,
};
pub use push::{build_notification, NotificationAction, NotificationDescriptor, PushMessage};
pub use request::{RequestDestination, RequestMode, WorkerRequest, WorkerResponse};
pub use strategy::{FetchResult, Handled, ResponseSource, Route, Router};
pub use worker::{
    ActivateReport, InstallReport, OfflineWorker, OfflineWorkerBuilder, SyncOutcome, WorkerStatus,
};
