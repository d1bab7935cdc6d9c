//! Cache bucket storage for the worker.
//!
//! Two backends implement [`CacheStorage`]:
//! - [`MemoryCacheStorage`] for tests and ephemeral runtimes
//! - [`SqliteCacheStorage`] for runtimes that must keep buckets across restarts
//!
//! [`limit_bucket_size`] implements the dynamic bucket's capacity rule.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryCacheStorage;
pub use sqlite::SqliteCacheStorage;
pub use traits::{BucketMeta, CacheEntry, CacheStorage};

use crate::error::Result;
use tracing::debug;

/// Delete the oldest entries of `bucket` until it holds at most `limit`.
///
/// Returns the number of entries evicted.
pub fn limit_bucket_size(storage: &dyn CacheStorage, bucket: &str, limit: usize) -> Result<usize> {
    let keys = storage.keys(bucket)?;
    if keys.len() <= limit {
        return Ok(0);
    }

    let excess = keys.len() - limit;
    let mut evicted = 0;
    for key in keys.iter().take(excess) {
        if storage.delete(bucket, key)? {
            evicted += 1;
        }
    }

    debug!("Evicted {} oldest entries from {}", evicted, bucket);
    Ok(evicted)
}
