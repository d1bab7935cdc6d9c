//! In-memory cache storage.

use super::traits::{BucketMeta, CacheEntry, CacheStorage};
use crate::error::{Result, WorkerError};
use crate::request::WorkerResponse;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Bucket {
    /// Entries keyed by insertion sequence.
    entries: BTreeMap<u64, CacheEntry>,
    /// Cache key -> insertion sequence.
    index: HashMap<String, u64>,
}

impl Bucket {
    fn insert(&mut self, seq: u64, entry: CacheEntry) {
        if let Some(old_seq) = self.index.insert(entry.key.clone(), seq) {
            self.entries.remove(&old_seq);
        }
        self.entries.insert(seq, entry);
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.index.remove(key) {
            Some(seq) => self.entries.remove(&seq).is_some(),
            None => false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Buckets in creation order.
    buckets: Vec<(String, Bucket)>,
    next_seq: u64,
}

impl Inner {
    fn bucket(&self, name: &str) -> Option<&Bucket> {
        self.buckets
            .iter()
            .find(|(bucket_name, _)| bucket_name == name)
            .map(|(_, bucket)| bucket)
    }

    fn bucket_mut(&mut self, name: &str) -> &mut Bucket {
        let position = match self.buckets.iter().position(|(n, _)| n == name) {
            Some(position) => position,
            None => {
                self.buckets.push((name.to_string(), Bucket::default()));
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[position].1
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Process-local cache storage. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    inner: Mutex<Inner>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| WorkerError::storage(format!("Failed to lock cache storage: {}", e)))
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, bucket: &str) -> Result<()> {
        self.lock()?.bucket_mut(bucket);
        Ok(())
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        Ok(self.lock()?.bucket(bucket).is_some())
    }

    fn bucket_names(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .buckets
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        let before = inner.buckets.len();
        inner.buckets.retain(|(name, _)| name != bucket);
        Ok(inner.buckets.len() != before)
    }

    fn put(&self, bucket: &str, key: &str, response: &WorkerResponse) -> Result<()> {
        let mut inner = self.lock()?;
        let seq = inner.next_seq();
        inner.bucket_mut(bucket).insert(
            seq,
            CacheEntry {
                key: key.to_string(),
                response: response.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn put_all(&self, bucket: &str, entries: &[(String, WorkerResponse)]) -> Result<()> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        for (key, response) in entries {
            let seq = inner.next_seq();
            inner.bucket_mut(bucket).insert(
                seq,
                CacheEntry {
                    key: key.clone(),
                    response: response.clone(),
                    cached_at: now,
                },
            );
        }
        // An empty manifest still creates the bucket.
        inner.bucket_mut(bucket);
        Ok(())
    }

    fn match_in(&self, bucket: &str, key: &str) -> Result<Option<CacheEntry>> {
        let inner = self.lock()?;
        Ok(inner.bucket(bucket).and_then(|b| {
            b.index
                .get(key)
                .and_then(|seq| b.entries.get(seq))
                .cloned()
        }))
    }

    fn keys(&self, bucket: &str) -> Result<Vec<String>> {
        let inner = self.lock()?;
        Ok(inner
            .bucket(bucket)
            .map(|b| b.entries.values().map(|e| e.key.clone()).collect())
            .unwrap_or_default())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.bucket(bucket).is_none() {
            return Ok(false);
        }
        Ok(inner.bucket_mut(bucket).remove(key))
    }

    fn len(&self, bucket: &str) -> Result<usize> {
        Ok(self.lock()?.bucket(bucket).map(|b| b.entries.len()).unwrap_or(0))
    }

    fn stats(&self) -> Result<Vec<BucketMeta>> {
        let inner = self.lock()?;
        Ok(inner
            .buckets
            .iter()
            .map(|(name, bucket)| BucketMeta {
                name: name.clone(),
                entry_count: bucket.entries.len(),
                total_size_bytes: bucket
                    .entries
                    .values()
                    .map(|e| e.response.body.len() as u64)
                    .sum(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> WorkerResponse {
        WorkerResponse::new("https://portal.example/", 200, body.to_string())
    }

    #[test]
    fn test_put_and_match() {
        let storage = MemoryCacheStorage::new();
        storage.put("static", "https://portal.example/", &response("home")).unwrap();

        let entry = storage.match_in("static", "https://portal.example/").unwrap().unwrap();
        assert_eq!(entry.response.body.as_ref(), b"home");
        assert!(storage.match_in("dynamic", "https://portal.example/").unwrap().is_none());
    }

    #[test]
    fn test_keys_follow_insertion_order_and_reput_moves_to_end() {
        let storage = MemoryCacheStorage::new();
        for key in ["a", "b", "c"] {
            storage.put("dynamic", key, &response(key)).unwrap();
        }
        storage.put("dynamic", "a", &response("a2")).unwrap();

        assert_eq!(storage.keys("dynamic").unwrap(), vec!["b", "c", "a"]);
        assert_eq!(
            storage.match_in("dynamic", "a").unwrap().unwrap().response.body.as_ref(),
            b"a2"
        );
    }

    #[test]
    fn test_bucket_names_in_creation_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("old-v1").unwrap();
        storage.open("static-v2").unwrap();
        storage.put("dynamic-v2", "k", &response("x")).unwrap();
        storage.open("old-v1").unwrap();

        assert_eq!(
            storage.bucket_names().unwrap(),
            vec!["old-v1", "static-v2", "dynamic-v2"]
        );
    }

    #[test]
    fn test_match_any_prefers_oldest_bucket() {
        let storage = MemoryCacheStorage::new();
        storage.put("first", "k", &response("one")).unwrap();
        storage.put("second", "k", &response("two")).unwrap();

        let entry = storage.match_any("k").unwrap().unwrap();
        assert_eq!(entry.response.body.as_ref(), b"one");
    }

    #[test]
    fn test_delete_entry_and_bucket() {
        let storage = MemoryCacheStorage::new();
        storage.put("b", "k1", &response("1")).unwrap();
        storage.put("b", "k2", &response("2")).unwrap();

        assert!(storage.delete("b", "k1").unwrap());
        assert!(!storage.delete("b", "k1").unwrap());
        assert!(!storage.delete("missing", "k1").unwrap());
        assert!(!storage.has("missing").unwrap());
        assert_eq!(storage.len("b").unwrap(), 1);

        assert!(storage.delete_bucket("b").unwrap());
        assert!(!storage.has("b").unwrap());
        assert!(!storage.delete_bucket("b").unwrap());
    }

    #[test]
    fn test_put_all_empty_creates_bucket() {
        let storage = MemoryCacheStorage::new();
        storage.put_all("static", &[]).unwrap();
        assert!(storage.has("static").unwrap());
    }

    #[test]
    fn test_stats() {
        let storage = MemoryCacheStorage::new();
        storage.put("b", "k1", &response("1234")).unwrap();
        storage.put("b", "k2", &response("56")).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].entry_count, 2);
        assert_eq!(stats[0].total_size_bytes, 6);
    }
}
