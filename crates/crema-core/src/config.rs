//! Centralized configuration for the Crema worker.
//!
//! Constant groups hold the defaults; [`WorkerConfig`] is the value built once
//! at startup (from defaults, a JSON file, or the `with_*` setters) and shared
//! with every handler as `Arc<WorkerConfig>`.

use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Application-level constants.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Mikel Coffee";
    pub const CACHE_PREFIX: &'static str = "mikel-coffee";
    pub const VERSION: &'static str = "v2.0.0";
    pub const ORIGIN: &'static str = "https://employee-hub-45.preview.emergentagent.com";
    pub const CLIENT_ORIGIN: &'static str = "https://baristalink.preview.emergentagent.com";
    pub const FALLBACK_WINDOW_URL: &'static str =
        "https://employee-hub-45.preview.emergentagent.com/";
    pub const LOGO_URL: &'static str = "https://customer-assets.emergentagent.com/job_0f64345d-2f6b-41c8-af15-208e01ade896/artifacts/fwptedkg_M%C4%B0KEL%20LOGOSU.png";
}

/// Cache bucket defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const DYNAMIC_LIMIT: usize = 50;
    pub const API_PREFIX: &'static str = "/api";
    pub const ROOT_DOCUMENT: &'static str = "/";
    pub const STATIC_EXTENSIONS: &'static [&'static str] = &[
        "js", "css", "png", "jpg", "jpeg", "gif", "svg", "woff", "woff2", "ttf", "eot",
    ];
    pub const SYNC_TAG: &'static str = "background-sync";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const USER_AGENT: &'static str = "Crema-Worker/0.3";
    pub const INSTALL_RETRY_ATTEMPTS: u32 = 3;
}

/// Notification presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationConfig {
    pub default_title: String,
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
    pub view_action_title: String,
    pub dismiss_action_title: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: AppConfig::APP_NAME.to_string(),
            default_body: "You have a new notification".to_string(),
            icon: AppConfig::LOGO_URL.to_string(),
            badge: AppConfig::LOGO_URL.to_string(),
            tag: "mikel-coffee-notification".to_string(),
            vibrate: vec![200, 100, 200],
            require_interaction: true,
            view_action_title: "View".to_string(),
            dismiss_action_title: "Dismiss".to_string(),
        }
    }
}

/// Worker configuration, version-stamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    /// Version stamp embedded in both bucket names.
    pub version: String,
    /// Prefix of the bucket names.
    pub cache_prefix: String,
    /// Origin the worker controls; relative URLs resolve against it.
    pub origin: Url,
    /// URLs cached at install time.
    pub precache: Vec<String>,
    /// Path prefix routed network-first even when cross-origin.
    pub api_prefix: String,
    /// File extensions routed cache-first.
    pub static_extensions: Vec<String>,
    /// Maximum number of entries in the dynamic bucket.
    pub dynamic_cache_limit: usize,
    /// Document served to offline navigations with no cached match.
    pub root_document: String,
    /// Origin of client windows that a notification click may focus.
    pub client_origin: Url,
    /// Window opened on notification click when no client matches.
    pub fallback_window_url: Url,
    /// Tag of the background sync event.
    pub sync_tag: String,
    /// Live fetch timeout in seconds.
    pub request_timeout_secs: u64,
    /// Activate right after install instead of waiting for the host.
    pub skip_waiting: bool,
    pub notification: NotificationConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: AppConfig::VERSION.to_string(),
            cache_prefix: AppConfig::CACHE_PREFIX.to_string(),
            origin: parse_const_url(AppConfig::ORIGIN),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                AppConfig::LOGO_URL.to_string(),
            ],
            api_prefix: CacheDefaults::API_PREFIX.to_string(),
            static_extensions: CacheDefaults::STATIC_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            dynamic_cache_limit: CacheDefaults::DYNAMIC_LIMIT,
            root_document: CacheDefaults::ROOT_DOCUMENT.to_string(),
            client_origin: parse_const_url(AppConfig::CLIENT_ORIGIN),
            fallback_window_url: parse_const_url(AppConfig::FALLBACK_WINDOW_URL),
            sync_tag: CacheDefaults::SYNC_TAG.to_string(),
            request_timeout_secs: NetworkConfig::REQUEST_TIMEOUT.as_secs(),
            skip_waiting: true,
            notification: NotificationConfig::default(),
        }
    }
}

fn parse_const_url(raw: &str) -> Url {
    Url::parse(raw).expect("AppConfig URLs are absolute")
}

impl WorkerConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| WorkerError::io_with_path(e, path))?;
        let config = Self::from_json_str(&raw)?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: WorkerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the version stamp.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the controlled origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Replace the precache manifest.
    pub fn with_precache<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the dynamic bucket capacity.
    pub fn with_dynamic_cache_limit(mut self, limit: usize) -> Self {
        self.dynamic_cache_limit = limit;
        self
    }

    /// Set the origin used to match client windows and the fallback window URL.
    pub fn with_client_origin(mut self, client_origin: Url, fallback_window_url: Url) -> Self {
        self.client_origin = client_origin;
        self.fallback_window_url = fallback_window_url;
        self
    }

    /// Choose whether a freshly installed version takes over immediately.
    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    /// Reject configurations the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(WorkerError::Config {
                message: "version must not be empty".to_string(),
            });
        }
        if self.dynamic_cache_limit == 0 {
            return Err(WorkerError::Config {
                message: "dynamicCacheLimit must be greater than zero".to_string(),
            });
        }
        if !self.api_prefix.starts_with('/') {
            return Err(WorkerError::Config {
                message: format!("apiPrefix must start with '/': {}", self.api_prefix),
            });
        }
        if self.origin.cannot_be_a_base() {
            return Err(WorkerError::Config {
                message: format!("origin is not a base URL: {}", self.origin),
            });
        }
        for entry in &self.precache {
            self.resolve(entry)?;
        }
        self.resolve(&self.root_document)?;
        Ok(())
    }

    /// Name of the install-time bucket.
    pub fn static_bucket(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.version)
    }

    /// Name of the runtime bucket.
    pub fn dynamic_bucket(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.version)
    }

    /// Whether `name` is one of this version's two buckets.
    pub fn is_current_bucket(&self, name: &str) -> bool {
        name == self.static_bucket() || name == self.dynamic_bucket()
    }

    /// Resolve a possibly-relative URL against the controlled origin.
    pub fn resolve(&self, raw: &str) -> Result<Url> {
        self.origin.join(raw).map_err(|e| WorkerError::Config {
            message: format!("invalid URL '{}': {}", raw, e),
        })
    }

    /// Absolute URL of the offline navigation fallback.
    pub fn root_document_url(&self) -> Result<Url> {
        self.resolve(&self.root_document)
    }

    /// Live fetch timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
