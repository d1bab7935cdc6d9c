//! SQLite-backed cache storage.
//!
//! Buckets survive restarts, so a new worker version finds the previous
//! version's buckets and purges them on activation. Insertion order is an
//! `AUTOINCREMENT` sequence column, never reused after deletes.

use super::traits::{BucketMeta, CacheEntry, CacheStorage};
use crate::error::{Result, WorkerError};
use crate::request::WorkerResponse;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite-based cache storage.
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteCacheStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStorage {
    /// Open (or create) the storage at the specified database path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| WorkerError::Io {
                    message: format!("Failed to create cache directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| WorkerError::Storage {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| WorkerError::Storage {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::with_connection(conn)
    }

    /// Storage backed by a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| WorkerError::Storage {
            message: format!("Failed to open in-memory cache database: {}", e),
            source: Some(e),
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| WorkerError::Storage {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Buckets, in creation order
            CREATE TABLE IF NOT EXISTS cache_buckets (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            -- Entries, in insertion order
            CREATE TABLE IF NOT EXISTS cache_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                cached_at TEXT NOT NULL,
                UNIQUE (bucket, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_bucket_seq
                ON cache_entries(bucket, seq);
            "#,
        )
        .map_err(|e| WorkerError::Storage {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn ensure_bucket(tx: &Transaction<'_>, bucket: &str) -> Result<()> {
        tx.execute(
            "INSERT OR IGNORE INTO cache_buckets (name, created_at) VALUES (?1, ?2)",
            params![bucket, Utc::now().to_rfc3339()],
        )
        .map_err(|e| WorkerError::Storage {
            message: format!("Failed to create bucket {}: {}", bucket, e),
            source: Some(e),
        })?;
        Ok(())
    }

    /// Delete-then-insert so a replaced key takes a fresh, newest sequence.
    fn insert_entry(
        tx: &Transaction<'_>,
        bucket: &str,
        key: &str,
        response: &WorkerResponse,
        cached_at: &str,
    ) -> Result<()> {
        let headers = serde_json::to_string(&response.headers)?;

        tx.execute(
            "DELETE FROM cache_entries WHERE bucket = ?1 AND key = ?2",
            params![bucket, key],
        )?;
        tx.execute(
            r#"
            INSERT INTO cache_entries
            (bucket, key, url, status, headers, body, size_bytes, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                bucket,
                key,
                response.url,
                response.status as i64,
                headers,
                response.body.as_ref(),
                response.body.len() as i64,
                cached_at,
            ],
        )
        .map_err(|e| WorkerError::Storage {
            message: format!("Failed to store {} in {}: {}", key, bucket, e),
            source: Some(e),
        })?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl CacheStorage for SqliteCacheStorage {
    fn open(&self, bucket: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::ensure_bucket(&tx, bucket)?;
        tx.commit()?;
        Ok(())
    }

    fn has(&self, bucket: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT seq FROM cache_buckets WHERE name = ?1",
                params![bucket],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn bucket_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM cache_buckets ORDER BY seq")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let entries = tx.execute(
            "DELETE FROM cache_entries WHERE bucket = ?1",
            params![bucket],
        )?;
        let deleted = tx.execute(
            "DELETE FROM cache_buckets WHERE name = ?1",
            params![bucket],
        )?;
        tx.commit()?;

        if deleted > 0 {
            debug!("Deleted bucket {} ({} entries)", bucket, entries);
        }
        Ok(deleted > 0)
    }

    fn put(&self, bucket: &str, key: &str, response: &WorkerResponse) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::ensure_bucket(&tx, bucket)?;
        Self::insert_entry(&tx, bucket, key, response, &Utc::now().to_rfc3339())?;
        tx.commit()?;
        Ok(())
    }

    fn put_all(&self, bucket: &str, entries: &[(String, WorkerResponse)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::ensure_bucket(&tx, bucket)?;
        let now = Utc::now().to_rfc3339();
        for (key, response) in entries {
            Self::insert_entry(&tx, bucket, key, response, &now)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn match_in(&self, bucket: &str, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;

        let row: Option<(String, i64, String, Vec<u8>, String)> = conn
            .query_row(
                r#"
                SELECT url, status, headers, body, cached_at
                FROM cache_entries
                WHERE bucket = ?1 AND key = ?2
                "#,
                params![bucket, key],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| WorkerError::Storage {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let Some((url, status, headers, body, cached_at)) = row else {
            return Ok(None);
        };

        let headers: Vec<(String, String)> = serde_json::from_str(&headers)?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            response: WorkerResponse {
                url,
                status: status as u16,
                headers,
                body: Bytes::from(body),
            },
            cached_at: parse_timestamp(&cached_at),
        }))
    }

    fn keys(&self, bucket: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key FROM cache_entries WHERE bucket = ?1 ORDER BY seq")?;
        let keys = stmt
            .query_map(params![bucket], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
            )
            .map_err(|e| WorkerError::Storage {
                message: format!("Failed to delete cache entry: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn len(&self, bucket: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE bucket = ?1",
            params![bucket],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn stats(&self) -> Result<Vec<BucketMeta>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT b.name, COUNT(e.seq), COALESCE(SUM(e.size_bytes), 0)
            FROM cache_buckets b
            LEFT JOIN cache_entries e ON e.bucket = b.name
            GROUP BY b.seq, b.name
            ORDER BY b.seq
            "#,
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(BucketMeta {
                    name: row.get(0)?,
                    entry_count: row.get::<_, i64>(1)? as usize,
                    total_size_bytes: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, SqliteCacheStorage) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache").join("buckets.sqlite");
        let storage = SqliteCacheStorage::new(&db_path).unwrap();
        (temp_dir, storage)
    }

    fn response(body: &str) -> WorkerResponse {
        WorkerResponse::new("https://portal.example/", 200, body.to_string())
            .with_header("content-type", "text/plain")
    }

    #[test]
    fn test_put_and_match_round_trips_headers() {
        let (_temp, storage) = create_test_storage();
        storage
            .put("static-v2", "https://portal.example/app.js", &response("js"))
            .unwrap();

        let entry = storage
            .match_in("static-v2", "https://portal.example/app.js")
            .unwrap()
            .unwrap();
        assert_eq!(entry.response.status, 200);
        assert_eq!(entry.response.header("Content-Type"), Some("text/plain"));
        assert_eq!(entry.response.body.as_ref(), b"js");
    }

    #[test]
    fn test_insertion_order_survives_replacement_and_deletes() {
        let (_temp, storage) = create_test_storage();
        for key in ["a", "b", "c", "d"] {
            storage.put("dynamic", key, &response(key)).unwrap();
        }
        storage.delete("dynamic", "b").unwrap();
        storage.put("dynamic", "a", &response("again")).unwrap();
        storage.put("dynamic", "e", &response("e")).unwrap();

        assert_eq!(storage.keys("dynamic").unwrap(), vec!["c", "d", "a", "e"]);
        assert_eq!(storage.len("dynamic").unwrap(), 4);
    }

    #[test]
    fn test_buckets_persist_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("buckets.sqlite");
        {
            let storage = SqliteCacheStorage::new(&db_path).unwrap();
            storage.open("mikel-coffee-static-v1").unwrap();
            storage
                .put("mikel-coffee-dynamic-v1", "k", &response("x"))
                .unwrap();
        }

        let storage = SqliteCacheStorage::new(&db_path).unwrap();
        assert_eq!(
            storage.bucket_names().unwrap(),
            vec!["mikel-coffee-static-v1", "mikel-coffee-dynamic-v1"]
        );
        assert!(storage.match_any("k").unwrap().is_some());
    }

    #[test]
    fn test_delete_bucket_removes_entries() {
        let (_temp, storage) = create_test_storage();
        storage.put("old", "k", &response("x")).unwrap();
        storage.put("new", "k2", &response("y")).unwrap();

        assert!(storage.delete_bucket("old").unwrap());
        assert!(!storage.delete_bucket("old").unwrap());
        assert!(storage.match_any("k").unwrap().is_none());
        assert!(storage.keys("old").unwrap().is_empty());
        assert_eq!(storage.bucket_names().unwrap(), vec!["new"]);
    }

    #[test]
    fn test_put_all_writes_every_entry() {
        let storage = SqliteCacheStorage::in_memory().unwrap();
        let entries = vec![
            ("/".to_string(), response("home")),
            ("/manifest.json".to_string(), response("{}")),
        ];
        storage.put_all("static", &entries).unwrap();

        assert_eq!(storage.keys("static").unwrap(), vec!["/", "/manifest.json"]);
    }

    #[test]
    fn test_stats_include_empty_buckets() {
        let storage = SqliteCacheStorage::in_memory().unwrap();
        storage.open("empty").unwrap();
        storage.put("full", "k", &response("12345")).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "empty");
        assert_eq!(stats[0].entry_count, 0);
        assert_eq!(stats[1].total_size_bytes, 5);
    }
}
