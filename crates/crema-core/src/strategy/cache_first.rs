//! Cache-first: cached copy when present, otherwise fetch and keep it.

use super::{Handled, StrategyContext};
use crate::error::Result;
use crate::request::WorkerRequest;
use tracing::{debug, warn};

/// Serve from any bucket; on a miss fetch live and store into the static
/// bucket. A failed live fetch propagates.
pub async fn cache_first(ctx: &StrategyContext<'_>, request: &WorkerRequest) -> Result<Handled> {
    if request.is_cacheable() {
        if let Some(entry) = ctx.storage.match_any(&request.cache_key())? {
            debug!("Cache hit for {}", request.url);
            return Ok(Handled::cache(entry.response));
        }
    }

    let response = ctx.fetcher.fetch(request).await?;

    if request.is_cacheable() {
        let bucket = ctx.config.static_bucket();
        if let Err(e) = ctx.storage.put(&bucket, &request.cache_key(), &response) {
            warn!("Failed to cache {}: {}", request.url, e);
        }
    }

    Ok(Handled::network(response))
}
