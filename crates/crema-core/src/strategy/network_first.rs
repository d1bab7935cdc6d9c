//! Network-first: live response when reachable, cache when offline.

use super::{Handled, StrategyContext};
use crate::cache::limit_bucket_size;
use crate::error::Result;
use crate::request::{cache_key_for, WorkerRequest, WorkerResponse};
use tracing::{debug, info, warn};

/// Fetch live, store 200s into the dynamic bucket, fall back to the cache
/// (then the root document for navigations) on network failure.
pub async fn network_first(ctx: &StrategyContext<'_>, request: &WorkerRequest) -> Result<Handled> {
    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            if response.is_ok() && request.is_cacheable() {
                if let Err(e) = store_dynamic(ctx, request, &response) {
                    warn!("Failed to cache {}: {}", request.url, e);
                }
            }
            Ok(Handled::network(response))
        }
        Err(err) if err.is_network_failure() => {
            info!("Network failed for {}, trying cache: {}", request.url, err);

            if request.is_cacheable() {
                if let Some(entry) = ctx.storage.match_any(&request.cache_key())? {
                    return Ok(Handled::cache(entry.response));
                }
            }

            if request.is_navigation() {
                let root = cache_key_for(&ctx.config.root_document_url()?);
                if let Some(entry) = ctx.storage.match_any(&root)? {
                    debug!("Serving root document for offline navigation to {}", request.url);
                    return Ok(Handled::fallback(entry.response));
                }
            }

            Err(err)
        }
        Err(err) => Err(err),
    }
}

fn store_dynamic(
    ctx: &StrategyContext<'_>,
    request: &WorkerRequest,
    response: &WorkerResponse,
) -> Result<()> {
    let bucket = ctx.config.dynamic_bucket();
    ctx.storage.put(&bucket, &request.cache_key(), response)?;
    limit_bucket_size(ctx.storage, &bucket, ctx.config.dynamic_cache_limit)?;
    Ok(())
}
