//! Fetch routing and caching strategies.
//!
//! [`Router::classify`] picks a [`Route`] for every intercepted request;
//! [`network_first`] and [`cache_first`] answer it from the network and the
//! cache buckets.

mod cache_first;
mod network_first;
mod route;

pub use cache_first::cache_first;
pub use network_first::network_first;
pub use route::{Route, Router};

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::network::Fetcher;
use crate::request::WorkerResponse;
use serde::{Deserialize, Serialize};

/// Where a handled response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Cached root document served to an offline navigation.
    Fallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Fallback => "fallback",
        }
    }
}

/// A response produced by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub response: WorkerResponse,
    pub source: ResponseSource,
}

impl Handled {
    pub fn network(response: WorkerResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    pub fn cache(response: WorkerResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }

    pub fn fallback(response: WorkerResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Fallback,
        }
    }
}

/// Result of the fetch handler.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Respond(Handled),
    /// The request is not intercepted and goes to the network untouched.
    Passthrough,
}

/// Borrowed capabilities a strategy runs against.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub config: &'a WorkerConfig,
    pub storage: &'a dyn CacheStorage,
    pub fetcher: &'a dyn Fetcher,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BucketMeta, CacheEntry, MemoryCacheStorage};
    use crate::error::{Result, WorkerError};
    use crate::request::WorkerRequest;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use url::Url;

    /// Serves canned responses; unknown URLs and offline mode fail like a
    /// dropped connection.
    #[derive(Default)]
    struct FakeFetcher {
        responses: Mutex<HashMap<String, u16>>,
        offline: std::sync::atomic::AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn serve(&self, url: &str, status: u16) {
            self.responses.lock().unwrap().insert(url.to_string(), status);
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(WorkerError::Network {
                    message: "offline".to_string(),
                    cause: None,
                });
            }
            let url = request.url.to_string();
            match self.responses.lock().unwrap().get(&url) {
                Some(status) => Ok(WorkerResponse::new(url.clone(), *status, format!("body of {}", url))),
                None => Err(WorkerError::Network {
                    message: format!("no route to {}", url),
                    cause: None,
                }),
            }
        }
    }

    /// Reads work; every write fails as if the disk were full.
    #[derive(Default)]
    struct FullDisk {
        inner: MemoryCacheStorage,
    }

    impl CacheStorage for FullDisk {
        fn open(&self, bucket: &str) -> Result<()> {
            self.inner.open(bucket)
        }

        fn has(&self, bucket: &str) -> Result<bool> {
            self.inner.has(bucket)
        }

        fn bucket_names(&self) -> Result<Vec<String>> {
            self.inner.bucket_names()
        }

        fn delete_bucket(&self, bucket: &str) -> Result<bool> {
            self.inner.delete_bucket(bucket)
        }

        fn put(&self, _bucket: &str, _key: &str, _response: &WorkerResponse) -> Result<()> {
            Err(WorkerError::storage("database or disk is full"))
        }

        fn put_all(&self, _bucket: &str, _entries: &[(String, WorkerResponse)]) -> Result<()> {
            Err(WorkerError::storage("database or disk is full"))
        }

        fn match_in(&self, bucket: &str, key: &str) -> Result<Option<CacheEntry>> {
            self.inner.match_in(bucket, key)
        }

        fn keys(&self, bucket: &str) -> Result<Vec<String>> {
            self.inner.keys(bucket)
        }

        fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
            self.inner.delete(bucket, key)
        }

        fn stats(&self) -> Result<Vec<BucketMeta>> {
            self.inner.stats()
        }
    }

    fn config() -> WorkerConfig {
        WorkerConfig::default()
            .with_origin(Url::parse("https://portal.example/").unwrap())
            .with_dynamic_cache_limit(3)
    }

    fn get(url: &str) -> WorkerRequest {
        WorkerRequest::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_network_first_stores_200_only() {
        let config = config();
        let storage = MemoryCacheStorage::new();
        let fetcher = FakeFetcher::default();
        fetcher.serve("https://portal.example/api/menu", 200);
        fetcher.serve("https://portal.example/api/missing", 404);
        let ctx = StrategyContext {
            config: &config,
            storage: &storage,
            fetcher: &fetcher,
        };

        let handled = network_first(&ctx, &get("https://portal.example/api/menu")).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Network);

        let handled = network_first(&ctx, &get("https://portal.example/api/missing")).await.unwrap();
        assert_eq!(handled.response.status, 404);

        let keys = storage.keys(&config.dynamic_bucket()).unwrap();
        assert_eq!(keys, vec!["https://portal.example/api/menu".to_string()]);
    }

    #[tokio::test]
    async fn test_network_first_enforces_limit() {
        let config = config();
        let storage = MemoryCacheStorage::new();
        let fetcher = FakeFetcher::default();
        let ctx = StrategyContext {
            config: &config,
            storage: &storage,
            fetcher: &fetcher,
        };

        for i in 0..5 {
            let url = format!("https://portal.example/api/item/{}", i);
            fetcher.serve(&url, 200);
            network_first(&ctx, &get(&url)).await.unwrap();
        }

        let keys = storage.keys(&config.dynamic_bucket()).unwrap();
        assert_eq!(
            keys,
            vec![
                "https://portal.example/api/item/2".to_string(),
                "https://portal.example/api/item/3".to_string(),
                "https://portal.example/api/item/4".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_network_first_offline_uses_cache() {
        let config = config();
        let storage = MemoryCacheStorage::new();
        let fetcher = FakeFetcher::default();
        fetcher.serve("https://portal.example/api/menu", 200);
        let ctx = StrategyContext {
            config: &config,
            storage: &storage,
            fetcher: &fetcher,
        };

        network_first(&ctx, &get("https://portal.example/api/menu")).await.unwrap();
        fetcher.go_offline();

        let handled = network_first(&ctx, &get("https://portal.example/api/menu")).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Cache);
        assert_eq!(handled.response.body, "body of https://portal.example/api/menu");
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back_to_root() {
        let config = config();
        let storage = MemoryCacheStorage::new();
        storage
            .put(
                &config.static_bucket(),
                "https://portal.example/",
                &WorkerResponse::new("https://portal.example/", 200, "<html>shell</html>"),
            )
            .unwrap();
        let fetcher = FakeFetcher::default();
        fetcher.go_offline();
        let ctx = StrategyContext {
            config: &config,
            storage: &storage,
            fetcher: &fetcher,
        };

        let request = WorkerRequest::navigate(Url::parse("https://portal.example/schedule").unwrap());
        let handled = network_first(&ctx, &request).await.unwrap();
        assert_eq!(handled.source, ResponseSource::Fallback);
        assert_eq!(handled.response.body, "<html>shell</html>");

        // A non-navigation miss propagates the network error.
        let err = network_first(&ctx, &get("https://portal.example/api/unknown")).await.unwrap_err();
        assert!(err.is_network_failure());
    }

    #[tokio::test]
    async fn test_cache_first_fetches_once() {
        let config = config();
        let storage = MemoryCacheStorage::new();
        let fetcher = FakeFetcher::default();
        fetcher.serve("https://portal.example/static/main.js", 200);
        let ctx = StrategyContext {
            config: &config,
            storage: &storage,
            fetcher: &fetcher,
        };
        let request = get("https://portal.example/static/main.js");

        let first = cache_first(&ctx, &request).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert!(storage
            .match_in(&config.static_bucket(), "https://portal.example/static/main.js")
            .unwrap()
            .is_some());

        fetcher.go_offline();
        let second = cache_first(&ctx, &request).await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_propagates() {
        let config = config();
        let storage = MemoryCacheStorage::new();
        let fetcher = FakeFetcher::default();
        fetcher.go_offline();
        let ctx = StrategyContext {
            config: &config,
            storage: &storage,
            fetcher: &fetcher,
        };

        let result = cache_first(&ctx, &get("https://portal.example/logo.png")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failed_cache_write_still_returns_live_response() {
        let config = config();
        let storage = FullDisk::default();
        let fetcher = FakeFetcher::default();
        fetcher.serve("https://portal.example/api/menu", 200);
        fetcher.serve("https://portal.example/static/main.js", 200);
        let ctx = StrategyContext {
            config: &config,
            storage: &storage,
            fetcher: &fetcher,
        };

        let api = network_first(&ctx, &get("https://portal.example/api/menu")).await.unwrap();
        assert_eq!(api.source, ResponseSource::Network);
        assert_eq!(api.response.body, "body of https://portal.example/api/menu");

        let script = cache_first(&ctx, &get("https://portal.example/static/main.js")).await.unwrap();
        assert_eq!(script.source, ResponseSource::Network);
        assert_eq!(script.response.body, "body of https://portal.example/static/main.js");

        assert!(storage.keys(&config.dynamic_bucket()).unwrap().is_empty());
        assert!(storage.keys(&config.static_bucket()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cache_write_fails_install() {
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.serve("https://portal.example/", 200);
        fetcher.serve("https://portal.example/index.html", 200);
        let worker = crate::worker::OfflineWorker::builder(config().with_precache(["/", "/index.html"]))
            .storage(Arc::new(FullDisk::default()))
            .fetcher(fetcher)
            .build()
            .unwrap();

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, WorkerError::Storage { .. }));
        assert!(!worker.lifecycle().skip_waiting_requested());
    }
}
