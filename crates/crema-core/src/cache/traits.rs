//! Cache storage trait and types.

use crate::error::Result;
use crate::request::WorkerResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached response with its key and insertion time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Absolute request URL without fragment.
    pub key: String,
    pub response: WorkerResponse,
    /// When the entry was stored.
    pub cached_at: DateTime<Utc>,
}

/// Metadata about one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketMeta {
    /// Bucket name.
    pub name: String,
    /// Number of entries in this bucket.
    pub entry_count: usize,
    /// Total size of all bodies in bytes.
    pub total_size_bytes: u64,
}

/// Named buckets of request → response entries.
///
/// Mirrors the browser Cache Storage API the worker was designed against:
/// - buckets enumerate in creation order
/// - entries enumerate in insertion order, oldest first
/// - re-putting a key replaces the entry and moves it to the newest position
/// - `put_all` is all-or-nothing
///
/// Each call is atomic with respect to other calls on the same storage. All
/// operations are synchronous to match rusqlite's API.
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist.
    fn open(&self, bucket: &str) -> Result<()>;

    /// Check whether a bucket exists.
    fn has(&self, bucket: &str) -> Result<bool>;

    /// All bucket names, in creation order.
    fn bucket_names(&self) -> Result<Vec<String>>;

    /// Delete a bucket and all of its entries.
    ///
    /// Returns `false` if the bucket did not exist.
    fn delete_bucket(&self, bucket: &str) -> Result<bool>;

    /// Store a response, creating the bucket if needed.
    fn put(&self, bucket: &str, key: &str, response: &WorkerResponse) -> Result<()>;

    /// Store several responses in one atomic write.
    fn put_all(&self, bucket: &str, entries: &[(String, WorkerResponse)]) -> Result<()>;

    /// Look up a key in one bucket.
    fn match_in(&self, bucket: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Look up a key across all buckets, oldest bucket first.
    fn match_any(&self, key: &str) -> Result<Option<CacheEntry>> {
        for bucket in self.bucket_names()? {
            if let Some(entry) = self.match_in(&bucket, key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Keys of a bucket, oldest first. Empty if the bucket does not exist.
    fn keys(&self, bucket: &str) -> Result<Vec<String>>;

    /// Delete one entry. Returns `false` if it was not present.
    fn delete(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Number of entries in a bucket.
    fn len(&self, bucket: &str) -> Result<usize> {
        Ok(self.keys(bucket)?.len())
    }

    /// Per-bucket statistics, in creation order.
    fn stats(&self) -> Result<Vec<BucketMeta>>;
}
