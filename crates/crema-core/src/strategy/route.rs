//! Fetch routing.

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::request::WorkerRequest;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// How an intercepted request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Route {
    /// Not intercepted; the runtime performs the request itself.
    Bypass,
    NetworkFirst,
    CacheFirst,
}

/// Classifies requests against the configured origin, API prefix and
/// static-asset extensions.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Url,
    api_prefix: String,
    static_assets: Regex,
}

impl Router {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        Ok(Self {
            origin: config.origin.clone(),
            api_prefix: config.api_prefix.clone(),
            static_assets: static_asset_pattern(&config.static_extensions)?,
        })
    }

    /// Pick the route for a request.
    ///
    /// Rules apply in order: cross-origin outside the API prefix bypasses,
    /// the API prefix is network-first, static extensions are cache-first,
    /// and everything else is network-first.
    pub fn classify(&self, request: &WorkerRequest) -> Route {
        let path = request.url.path();
        let is_api = path.starts_with(&self.api_prefix);

        if request.url.origin() != self.origin.origin() && !is_api {
            return Route::Bypass;
        }
        if is_api {
            return Route::NetworkFirst;
        }
        if self.static_assets.is_match(path) {
            return Route::CacheFirst;
        }
        Route::NetworkFirst
    }
}

/// Build `\.(ext1|ext2|...)$` from a list of extensions.
fn static_asset_pattern(extensions: &[String]) -> Result<Regex> {
    let alternatives: Vec<String> = extensions
        .iter()
        .map(|ext| regex::escape(ext.trim_start_matches('.')))
        .collect();
    let pattern = format!(r"\.({})$", alternatives.join("|"));

    Regex::new(&pattern).map_err(|e| WorkerError::Config {
        message: format!("invalid static extension pattern '{}': {}", pattern, e),
    })
}
