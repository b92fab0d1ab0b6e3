//! Compressing, statistics-tracked cache over a pluggable byte store.
//!
//! Values are serialized with `serde_json`. Payloads above
//! [`COMPRESSION_THRESHOLD`] are gzip-compressed and stored under a distinct
//! physical key:
//!
//! ```text
//! <namespace>:<entity-type>:<encoded-key>      plain JSON
//! <namespace>:<entity-type>:<encoded-key>:gz   gzip(JSON)
//! ```
//!
//! A write stores one variant and deletes the other in the same atomic batch.
//! Failures never escape this module: reads degrade to misses, writes report
//! `false`, and both are counted in [`CacheStats`].

mod backend;
mod codec;
mod redis_backend;
mod stats;

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ValidationError;

pub use backend::{BackendFuture, CacheBackend, MemoryBackend, WriteOp};
pub use codec::COMPRESSION_THRESHOLD;
pub use redis_backend::{RedisBackend, RedisSettings};
pub use stats::CacheStats;

use codec::Encoded;
use stats::StatsRegistry;

const COMPRESSED_SUFFIX: &str = ":gz";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache serialization failed: {0}")]
    Serialization(String),
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache compression failed: {0}")]
    Compression(String),
    #[error("cache decompression failed: {0}")]
    Decompression(String),
    #[error("cached value could not be decoded: {0}")]
    Decode(String),
}

/// Kind of cached payload; selects the key space and default TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    News,
    Search,
    Trending,
    Product,
    Price,
}

impl EntityType {
    pub const ALL: [Self; 5] = [
        Self::News,
        Self::Search,
        Self::Trending,
        Self::Product,
        Self::Price,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Search => "search",
            Self::Trending => "trending",
            Self::Product => "product",
            Self::Price => "price",
        }
    }

    pub const fn default_ttl(self) -> Duration {
        match self {
            Self::News => Duration::from_secs(300),
            Self::Search => Duration::from_secs(600),
            Self::Trending => Duration::from_secs(900),
            Self::Product => Duration::from_secs(3600),
            Self::Price => Duration::from_secs(60),
        }
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|entity| entity.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidEntityType {
                value: value.to_string(),
            })
    }
}

/// Key layout, TTL and compression settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub namespace: String,
    /// Used for entity types with no entry in `type_ttls`.
    pub default_ttl: Duration,
    pub type_ttls: HashMap<EntityType, Duration>,
    pub compression_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: String::from("ferrofeed"),
            default_ttl: Duration::from_secs(300),
            type_ttls: EntityType::ALL
                .into_iter()
                .map(|entity| (entity, entity.default_ttl()))
                .collect(),
            compression_threshold: COMPRESSION_THRESHOLD,
        }
    }
}

impl CacheConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_type_ttl(mut self, entity: EntityType, ttl: Duration) -> Self {
        self.type_ttls.insert(entity, ttl);
        self
    }

    /// Explicit TTL, then the per-type setting, then the global default.
    pub fn resolve_ttl(&self, entity: EntityType, explicit: Option<Duration>) -> Duration {
        explicit
            .or_else(|| self.type_ttls.get(&entity).copied())
            .unwrap_or(self.default_ttl)
    }
}

/// Everything needed to build a Redis-backed [`Cache`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheSettings {
    pub connection: RedisSettings,
    pub config: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHealth {
    pub healthy: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    stats: StatsRegistry,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            stats: StatsRegistry::default(),
        }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    /// Builds a Redis-backed cache. No connection is made until first use.
    pub fn redis(settings: &CacheSettings) -> Result<Self, CacheError> {
        let backend = RedisBackend::new(&settings.connection)?;
        info!(
            url = %settings.connection.display_url(),
            namespace = %settings.config.namespace,
            "configured redis cache"
        );
        Ok(Self::new(Arc::new(backend), settings.config.clone()))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn physical_key(&self, entity: EntityType, key: &str) -> String {
        format!(
            "{}:{}:{}",
            self.config.namespace,
            entity,
            urlencoding::encode(key)
        )
    }

    pub fn compressed_key(&self, entity: EntityType, key: &str) -> String {
        let mut physical = self.physical_key(entity, key);
        physical.push_str(COMPRESSED_SUFFIX);
        physical
    }

    pub async fn get<T: DeserializeOwned>(&self, entity: EntityType, key: &str) -> Option<T> {
        let physical = vec![
            self.physical_key(entity, key),
            self.compressed_key(entity, key),
        ];

        match self.backend.get_many(&physical).await {
            Ok(mut values) if values.len() == 2 => {
                let compressed = values.pop().flatten();
                let plain = values.pop().flatten();
                self.decode_slot(entity, key, plain, compressed)
            }
            Ok(values) => {
                let error = unexpected_shape(2, values.len());
                self.record_failure(entity, &error);
                self.stats.record_miss(entity);
                None
            }
            Err(error) => {
                self.record_failure(entity, &error);
                self.stats.record_miss(entity);
                None
            }
        }
    }

    /// Reads all keys in one backend round trip. The result is positionally
    /// aligned with `keys`; each key counts as one hit or miss.
    pub async fn batch_get<T, K>(&self, entity: EntityType, keys: &[K]) -> Vec<Option<T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        if keys.is_empty() {
            return Vec::new();
        }

        let physical: Vec<String> = keys
            .iter()
            .flat_map(|key| {
                let key = key.as_ref();
                [
                    self.physical_key(entity, key),
                    self.compressed_key(entity, key),
                ]
            })
            .collect();

        let values = match self.backend.get_many(&physical).await {
            Ok(values) if values.len() == physical.len() => values,
            Ok(values) => {
                self.record_failure(entity, &unexpected_shape(physical.len(), values.len()));
                return self.all_misses(entity, keys.len());
            }
            Err(error) => {
                self.record_failure(entity, &error);
                return self.all_misses(entity, keys.len());
            }
        };

        let mut slots = values.into_iter();
        keys.iter()
            .map(|key| {
                let plain = slots.next().flatten();
                let compressed = slots.next().flatten();
                self.decode_slot(entity, key.as_ref(), plain, compressed)
            })
            .collect()
    }

    /// Stores a value. Returns `false` when nothing was written, including
    /// when the resolved TTL is zero.
    pub async fn set<T: Serialize>(
        &self,
        entity: EntityType,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let ttl = self.config.resolve_ttl(entity, ttl);
        if ttl.is_zero() {
            debug!(entity = %entity, key = %key, "cache write skipped for zero ttl");
            return false;
        }

        let ops = match self.write_ops(entity, key, value, ttl) {
            Ok(ops) => ops,
            Err(error) => {
                self.record_failure(entity, &error);
                return false;
            }
        };

        self.commit(entity, Vec::from(ops)).await
    }

    /// Stores every entry in one atomic backend round trip. Entries that fail
    /// to serialize are skipped and counted; the result is `true` only when
    /// every entry was written.
    pub async fn batch_set<T, K>(
        &self,
        entity: EntityType,
        entries: &[(K, T)],
        ttl: Option<Duration>,
    ) -> bool
    where
        T: Serialize,
        K: AsRef<str>,
    {
        if entries.is_empty() {
            return true;
        }

        let ttl = self.config.resolve_ttl(entity, ttl);
        if ttl.is_zero() {
            debug!(entity = %entity, entries = entries.len(), "cache batch write skipped for zero ttl");
            return false;
        }

        let mut ops = Vec::with_capacity(entries.len() * 2);
        let mut complete = true;
        for (key, value) in entries {
            match self.write_ops(entity, key.as_ref(), value, ttl) {
                Ok(entry_ops) => ops.extend(entry_ops),
                Err(error) => {
                    self.record_failure(entity, &error);
                    complete = false;
                }
            }
        }

        if ops.is_empty() {
            return false;
        }

        self.commit(entity, ops).await && complete
    }

    /// Removes both physical variants of a key.
    pub async fn invalidate(&self, entity: EntityType, key: &str) -> bool {
        let ops = vec![
            WriteOp::Delete {
                key: self.physical_key(entity, key),
            },
            WriteOp::Delete {
                key: self.compressed_key(entity, key),
            },
        ];
        self.commit(entity, ops).await
    }

    /// Removes every key of one entity type, returning the number removed.
    pub async fn clear_type(&self, entity: EntityType) -> u64 {
        let prefix = format!("{}:{}:", self.config.namespace, entity);
        match self.backend.delete_prefix(&prefix).await {
            Ok(removed) => {
                info!(entity = %entity, removed, "cleared cache entity type");
                removed
            }
            Err(error) => {
                self.record_failure(entity, &error);
                0
            }
        }
    }

    pub async fn health_check(&self) -> CacheHealth {
        let started = Instant::now();
        let result = self.backend.ping().await;
        let latency = started.elapsed();

        match result {
            Ok(()) => CacheHealth {
                healthy: true,
                latency,
                error: None,
            },
            Err(error) => {
                warn!(error = %error, "cache health check failed");
                CacheHealth {
                    healthy: false,
                    latency,
                    error: Some(error.to_string()),
                }
            }
        }
    }

    pub fn stats(&self, entity: EntityType) -> CacheStats {
        self.stats.snapshot(entity)
    }

    pub fn all_stats(&self) -> BTreeMap<EntityType, CacheStats> {
        self.stats.all()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    fn write_ops<T: Serialize>(
        &self,
        entity: EntityType,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<[WriteOp; 2], CacheError> {
        let plain_key = self.physical_key(entity, key);
        let compressed_key = self.compressed_key(entity, key);

        Ok(match codec::encode(value, self.config.compression_threshold)? {
            Encoded::Plain(bytes) => [
                WriteOp::Set {
                    key: plain_key,
                    value: bytes,
                    ttl,
                },
                WriteOp::Delete {
                    key: compressed_key,
                },
            ],
            Encoded::Compressed(bytes) => [
                WriteOp::Set {
                    key: compressed_key,
                    value: bytes,
                    ttl,
                },
                WriteOp::Delete { key: plain_key },
            ],
        })
    }

    async fn commit(&self, entity: EntityType, ops: Vec<WriteOp>) -> bool {
        match self.backend.write(ops).await {
            Ok(()) => true,
            Err(error) => {
                self.record_failure(entity, &error);
                false
            }
        }
    }

    fn decode_slot<T: DeserializeOwned>(
        &self,
        entity: EntityType,
        key: &str,
        plain: Option<Vec<u8>>,
        compressed: Option<Vec<u8>>,
    ) -> Option<T> {
        let decoded = match (plain, compressed) {
            (Some(bytes), _) => codec::decode(&bytes, false),
            (None, Some(bytes)) => codec::decode(&bytes, true),
            (None, None) => {
                debug!(entity = %entity, key = %key, "cache miss");
                self.stats.record_miss(entity);
                return None;
            }
        };

        match decoded {
            Ok(value) => {
                debug!(entity = %entity, key = %key, "cache hit");
                self.stats.record_hit(entity);
                Some(value)
            }
            Err(error) => {
                self.record_failure(entity, &error);
                self.stats.record_miss(entity);
                None
            }
        }
    }

    fn all_misses<T>(&self, entity: EntityType, count: usize) -> Vec<Option<T>> {
        (0..count)
            .map(|_| {
                self.stats.record_miss(entity);
                None
            })
            .collect()
    }

    fn record_failure(&self, entity: EntityType, error: &CacheError) {
        warn!(entity = %entity, error = %error, "cache operation failed");
        self.stats.record_error(entity, error);
    }
}

fn unexpected_shape(expected: usize, actual: usize) -> CacheError {
    CacheError::Backend(format!(
        "backend returned {actual} values for {expected} keys"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (Cache, MemoryBackend) {
        let backend = MemoryBackend::new();
        let cache = Cache::new(
            Arc::new(backend.clone()),
            CacheConfig::default().with_namespace("test"),
        );
        (cache, backend)
    }

    #[test]
    fn entity_types_parse_case_insensitively() {
        assert_eq!("News".parse::<EntityType>(), Ok(EntityType::News));
        assert_eq!(" price ".parse::<EntityType>(), Ok(EntityType::Price));
        assert!("weather".parse::<EntityType>().is_err());
    }

    #[test]
    fn ttl_resolution_prefers_explicit_then_type_then_default() {
        let mut config = CacheConfig::default();
        config.type_ttls.remove(&EntityType::Product);
        config.default_ttl = Duration::from_secs(42);

        assert_eq!(
            config.resolve_ttl(EntityType::News, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.resolve_ttl(EntityType::News, None),
            Duration::from_secs(300)
        );
        assert_eq!(
            config.resolve_ttl(EntityType::Product, None),
            Duration::from_secs(42)
        );
    }

    #[test]
    fn physical_keys_cannot_collide_with_compressed_variants() {
        let (cache, _) = cache();

        assert_eq!(cache.physical_key(EntityType::News, "latest"), "test:news:latest");
        assert_eq!(
            cache.compressed_key(EntityType::News, "latest"),
            "test:news:latest:gz"
        );
        assert_ne!(
            cache.physical_key(EntityType::News, "latest:gz"),
            cache.compressed_key(EntityType::News, "latest")
        );
    }

    #[tokio::test]
    async fn small_value_is_stored_plain() {
        let (cache, backend) = cache();

        assert!(cache.set(EntityType::News, "k", &vec![1, 2, 3], None).await);

        assert_eq!(backend.raw("test:news:k").await, Some(b"[1,2,3]".to_vec()));
        assert!(backend.raw("test:news:k:gz").await.is_none());
        assert_eq!(cache.get::<Vec<i32>>(EntityType::News, "k").await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn rewriting_switches_variant_and_removes_the_other() {
        let (cache, backend) = cache();
        let large = "x".repeat(4096);

        cache.set(EntityType::News, "k", &large, None).await;
        assert!(backend.raw("test:news:k:gz").await.is_some());
        assert!(backend.raw("test:news:k").await.is_none());

        cache.set(EntityType::News, "k", &"small", None).await;
        assert!(backend.raw("test:news:k:gz").await.is_none());
        assert_eq!(
            cache.get::<String>(EntityType::News, "k").await.as_deref(),
            Some("small")
        );
    }

    #[tokio::test]
    async fn zero_ttl_skips_the_write() {
        let (cache, backend) = cache();

        let written = cache
            .set(EntityType::Price, "k", &1, Some(Duration::ZERO))
            .await;

        assert!(!written);
        assert!(backend.is_empty().await);
        assert_eq!(backend.round_trips(), 0);
    }

    #[tokio::test]
    async fn undecodable_value_counts_as_error_and_miss() {
        let (cache, backend) = cache();
        backend
            .write(vec![WriteOp::Set {
                key: String::from("test:news:k"),
                value: b"not json".to_vec(),
                ttl: Duration::from_secs(60),
            }])
            .await
            .expect("writes");

        assert_eq!(cache.get::<Vec<i32>>(EntityType::News, "k").await, None);

        let stats = cache.stats(EntityType::News);
        assert_eq!((stats.hits, stats.misses, stats.errors), (0, 1, 1));
        assert!(stats.last_error.is_some());
    }

    #[tokio::test]
    async fn batch_get_uses_one_round_trip_and_counts_per_key() {
        let (cache, backend) = cache();
        cache
            .batch_set(EntityType::Search, &[("a", 1), ("b", 2)], None)
            .await;
        let before = backend.round_trips();

        let values: Vec<Option<i32>> = cache
            .batch_get(EntityType::Search, &["a", "missing", "b"])
            .await;

        assert_eq!(values, vec![Some(1), None, Some(2)]);
        assert_eq!(backend.round_trips() - before, 1);
        let stats = cache.stats(EntityType::Search);
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[tokio::test]
    async fn invalidate_and_clear_type() {
        let (cache, _) = cache();
        cache.set(EntityType::News, "a", &1, None).await;
        cache.set(EntityType::News, "b", &"y".repeat(2048), None).await;
        cache.set(EntityType::Trending, "a", &3, None).await;

        assert!(cache.invalidate(EntityType::News, "a").await);
        assert_eq!(cache.get::<i32>(EntityType::News, "a").await, None);

        assert_eq!(cache.clear_type(EntityType::News).await, 1);
        assert_eq!(cache.get::<String>(EntityType::News, "b").await, None);
        assert_eq!(cache.get::<i32>(EntityType::Trending, "a").await, Some(3));
    }

    #[tokio::test]
    async fn stats_are_scoped_per_instance_and_resettable() {
        let (first, _) = cache();
        let (second, _) = cache();

        first.get::<i32>(EntityType::News, "missing").await;

        assert_eq!(first.stats(EntityType::News).misses, 1);
        assert_eq!(second.stats(EntityType::News).misses, 0);

        first.reset_stats();
        assert_eq!(first.all_stats()[&EntityType::News], CacheStats::default());
    }

    #[tokio::test]
    async fn health_check_reports_memory_backend_healthy() {
        let (cache, _) = cache();
        let health = cache.health_check().await;
        assert!(health.healthy);
        assert!(health.error.is_none());
    }
}
