//! Storage seam for [`Cache`](crate::cache::Cache).
//!
//! A backend only moves bytes: the cache layer owns key layout, encoding and
//! statistics. Every method is one round trip, and `write` applies its
//! operations atomically.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::cache::CacheError;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// One mutation inside an atomic write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

pub trait CacheBackend: Send + Sync {
    /// Reads every key in one round trip; the result is positionally aligned
    /// with `keys`.
    fn get_many<'a>(&'a self, keys: &'a [String]) -> BackendFuture<'a, Vec<Option<Vec<u8>>>>;

    /// Applies all operations atomically.
    fn write(&self, ops: Vec<WriteOp>) -> BackendFuture<'_, ()>;

    /// Deletes every key starting with `prefix`, returning how many went.
    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, u64>;

    fn ping(&self) -> BackendFuture<'_, ()>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local backend with per-entry expiry.
///
/// Expired entries are hidden from reads and purged on the next write.
/// Counts round trips so callers can assert batching behavior.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
    round_trips: Arc<AtomicU64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend calls served so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Raw stored bytes for a physical key, ignoring expiry.
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.is_live(now));
    }

    fn count_round_trip(&self) {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
    }
}

impl CacheBackend for MemoryBackend {
    fn get_many<'a>(&'a self, keys: &'a [String]) -> BackendFuture<'a, Vec<Option<Vec<u8>>>> {
        Box::pin(async move {
            self.count_round_trip();
            let entries = self.entries.read().await;
            let now = Instant::now();
            Ok(keys
                .iter()
                .map(|key| {
                    entries
                        .get(key)
                        .filter(|entry| entry.is_live(now))
                        .map(|entry| entry.value.clone())
                })
                .collect())
        })
    }

    fn write(&self, ops: Vec<WriteOp>) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.count_round_trip();
            let mut entries = self.entries.write().await;
            let now = Instant::now();
            entries.retain(|_, entry| entry.is_live(now));
            for op in ops {
                match op {
                    WriteOp::Set { key, value, ttl } => {
                        entries.insert(
                            key,
                            MemoryEntry {
                                value,
                                expires_at: now + ttl,
                            },
                        );
                    }
                    WriteOp::Delete { key } => {
                        entries.remove(&key);
                    }
                }
            }
            Ok(())
        })
    }

    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, u64> {
        Box::pin(async move {
            self.count_round_trip();
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(prefix));
            Ok((before - entries.len()) as u64)
        })
    }

    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.count_round_trip();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, value: &str, ttl: Duration) -> WriteOp {
        WriteOp::Set {
            key: key.to_string(),
            value: value.as_bytes().to_vec(),
            ttl,
        }
    }

    #[tokio::test]
    async fn get_many_is_positional() {
        let backend = MemoryBackend::new();
        backend
            .write(vec![set("a", "1", Duration::from_secs(60))])
            .await
            .expect("writes");

        let keys = vec![String::from("missing"), String::from("a")];
        let values = backend.get_many(&keys).await.expect("reads");

        assert_eq!(values, vec![None, Some(b"1".to_vec())]);
    }

    #[tokio::test]
    async fn entries_expire() {
        let backend = MemoryBackend::new();
        backend
            .write(vec![set("a", "1", Duration::from_millis(50))])
            .await
            .expect("writes");

        tokio::time::sleep(Duration::from_millis(80)).await;

        let keys = vec![String::from("a")];
        assert_eq!(backend.get_many(&keys).await.expect("reads"), vec![None]);
        assert_eq!(backend.len().await, 1);
        backend.clear_expired().await;
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn writes_purge_expired_entries() {
        let backend = MemoryBackend::new();
        let short_lived = (0..1000)
            .map(|n| set(&format!("k{n}"), "v", Duration::from_millis(1)))
            .collect();
        backend.write(short_lived).await.expect("writes");

        tokio::time::sleep(Duration::from_millis(20)).await;
        let keys: Vec<String> = (0..1000).map(|n| format!("k{n}")).collect();
        let values = backend.get_many(&keys).await.expect("reads");
        assert!(values.iter().all(Option::is_none));

        backend
            .write(vec![set("fresh", "1", Duration::from_secs(60))])
            .await
            .expect("writes");

        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.raw("fresh").await, Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn write_batch_sets_and_deletes_together() {
        let backend = MemoryBackend::new();
        backend
            .write(vec![set("a", "1", Duration::from_secs(60))])
            .await
            .expect("writes");

        backend
            .write(vec![
                set("b", "2", Duration::from_secs(60)),
                WriteOp::Delete {
                    key: String::from("a"),
                },
            ])
            .await
            .expect("writes");

        assert!(backend.raw("a").await.is_none());
        assert_eq!(backend.raw("b").await, Some(b"2".to_vec()));
        assert_eq!(backend.round_trips(), 2);
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_matching_keys() {
        let backend = MemoryBackend::new();
        backend
            .write(vec![
                set("ns:news:a", "1", Duration::from_secs(60)),
                set("ns:news:b:gz", "2", Duration::from_secs(60)),
                set("ns:search:a", "3", Duration::from_secs(60)),
            ])
            .await
            .expect("writes");

        let removed = backend.delete_prefix("ns:news:").await.expect("deletes");

        assert_eq!(removed, 2);
        assert!(backend.raw("ns:search:a").await.is_some());
    }
}
