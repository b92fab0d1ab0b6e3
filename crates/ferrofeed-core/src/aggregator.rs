//! Weighted fan-out over registered sources with cache write-through.
//!
//! ```text
//! cache.get ──hit──▶ return
//!     │miss
//!     ▼
//! quotas ─▶ spawn one task per enabled source ─▶ join_all ─▶ drop failures
//!     ─▶ merge (newest first, dedupe by id) ─▶ cache.set ─▶ return
//! ```
//!
//! Query methods never fail: a source that errors or panics contributes no
//! items and is logged as a partial failure.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapters::{FinnhubAdapter, GNewsAdapter, NewsApiAdapter};
use crate::cache::{Cache, CacheConfig, EntityType};
use crate::config::{FeedConfig, SourceKind, SourceSettings};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::source::{SourceAdapter, SourceDescriptor, SourceError};
use crate::{CoreError, DateRange, ImpactLevel, NormalizedItem, SourceId, UtcDateTime};

/// Size of the `get_latest` window the derived queries scan.
pub const DERIVED_WINDOW: usize = 100;

type FetchFuture =
    Pin<Box<dyn Future<Output = Result<Vec<NormalizedItem>, SourceError>> + Send + 'static>>;

struct RegisteredSource {
    descriptor: SourceDescriptor,
    adapter: Arc<dyn SourceAdapter>,
}

/// Category frequency across the recent window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingTopic {
    pub topic: String,
    pub count: usize,
}

/// Result of one fan-out round before caching.
struct FanOut {
    items: Vec<NormalizedItem>,
    succeeded: usize,
}

pub struct Aggregator {
    cache: Arc<Cache>,
    sources: RwLock<Vec<RegisteredSource>>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("cache", &self.cache)
            .field("sources", &self.sources())
            .finish()
    }
}

impl Aggregator {
    pub fn new(
        cache: Arc<Cache>,
        sources: Vec<(SourceDescriptor, Arc<dyn SourceAdapter>)>,
    ) -> Self {
        let sources: Vec<RegisteredSource> = sources
            .into_iter()
            .map(|(descriptor, adapter)| RegisteredSource {
                descriptor,
                adapter,
            })
            .collect();

        info!(
            sources = sources.len(),
            enabled = sources.iter().filter(|s| s.descriptor.enabled).count(),
            "aggregator initialized"
        );

        Self {
            cache,
            sources: RwLock::new(sources),
        }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Newest items across all enabled sources.
    pub async fn get_latest(&self, limit: usize) -> Vec<NormalizedItem> {
        if limit == 0 {
            return Vec::new();
        }

        let key = format!("latest:{limit}");
        self.cached(EntityType::News, &key, limit, "latest", |adapter, quota| {
            Box::pin(async move { adapter.fetch_latest(quota).await })
        })
        .await
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<NormalizedItem> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let key = format!("search:{}:{limit}", urlencoding::encode(query));
        let owned = Arc::<str>::from(query);
        self.cached(EntityType::Search, &key, limit, "search", move |adapter, quota| {
            let query = Arc::clone(&owned);
            Box::pin(async move { adapter.fetch_search(&query, quota).await })
        })
        .await
    }

    /// Items published within `[start, end]`. An inverted range yields
    /// nothing.
    pub async fn get_by_date_range(
        &self,
        start: UtcDateTime,
        end: UtcDateTime,
        limit: usize,
    ) -> Vec<NormalizedItem> {
        let range = match DateRange::new(start, end) {
            Ok(range) => range,
            Err(error) => {
                debug!(error = %error, "rejecting inverted date range");
                return Vec::new();
            }
        };
        if limit == 0 {
            return Vec::new();
        }

        let key = format!("range:{start}:{end}:{limit}");
        self.cached(EntityType::News, &key, limit, "range", move |adapter, quota| {
            Box::pin(async move { adapter.fetch_range(range, quota).await })
        })
        .await
    }

    pub async fn get_by_impact_level(&self, level: ImpactLevel, limit: usize) -> Vec<NormalizedItem> {
        self.get_latest(DERIVED_WINDOW)
            .await
            .into_iter()
            .filter(|item| item.impact_level() == Some(level))
            .take(limit)
            .collect()
    }

    pub async fn get_by_category(&self, category: &str, limit: usize) -> Vec<NormalizedItem> {
        self.get_latest(DERIVED_WINDOW)
            .await
            .into_iter()
            .filter(|item| item.has_category(category))
            .take(limit)
            .collect()
    }

    /// Most frequent categories in the recent window. Ties keep the order in
    /// which topics first appear; the first spelling seen is reported.
    pub async fn get_trending_topics(&self, limit: usize) -> Vec<TrendingTopic> {
        let items = self.get_latest(DERIVED_WINDOW).await;

        let mut topics: Vec<TrendingTopic> = Vec::new();
        for category in items.iter().flat_map(|item| item.categories.iter()) {
            match topics
                .iter_mut()
                .find(|topic| topic.topic.eq_ignore_ascii_case(category))
            {
                Some(topic) => topic.count += 1,
                None => topics.push(TrendingTopic {
                    topic: category.clone(),
                    count: 1,
                }),
            }
        }

        topics.sort_by(|left, right| right.count.cmp(&left.count));
        topics.truncate(limit);
        topics
    }

    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.read_sources()
            .iter()
            .map(|source| source.descriptor.clone())
            .collect()
    }

    /// Returns `false` when no source has this id.
    pub fn enable_source(&self, id: &SourceId) -> bool {
        self.set_enabled(id, true)
    }

    pub fn disable_source(&self, id: &SourceId) -> bool {
        self.set_enabled(id, false)
    }

    /// Per-source item quotas for enabled sources, in registration order.
    ///
    /// Each source gets `max(1, round(w / Σw * limit))`; when every weight is
    /// zero the shares are equal. The sum may exceed `limit`.
    pub fn quotas(&self, limit: usize) -> Vec<(SourceId, usize)> {
        let sources = self.read_sources();
        let weights: Vec<(SourceId, f64)> = sources
            .iter()
            .filter(|source| source.descriptor.enabled)
            .map(|source| (source.descriptor.id.clone(), source.descriptor.weight()))
            .collect();
        drop(sources);

        allocate(&weights, limit)
    }

    async fn cached<F>(
        &self,
        entity: EntityType,
        key: &str,
        limit: usize,
        operation: &'static str,
        invoke: F,
    ) -> Vec<NormalizedItem>
    where
        F: Fn(Arc<dyn SourceAdapter>, usize) -> FetchFuture,
    {
        if let Some(items) = self.cache.get::<Vec<NormalizedItem>>(entity, key).await {
            return items;
        }

        let FanOut { items, succeeded } = self.fan_out(operation, limit, invoke).await;
        if succeeded > 0 {
            self.cache.set(entity, key, &items, None).await;
        } else {
            debug!(operation, key = %key, "no source succeeded; skipping cache write");
        }
        items
    }

    async fn fan_out<F>(&self, operation: &'static str, limit: usize, invoke: F) -> FanOut
    where
        F: Fn(Arc<dyn SourceAdapter>, usize) -> FetchFuture,
    {
        let plan: Vec<(SourceId, Arc<dyn SourceAdapter>, usize)> = {
            let sources = self.read_sources();
            let enabled: Vec<&RegisteredSource> = sources
                .iter()
                .filter(|source| source.descriptor.enabled)
                .collect();
            let weights: Vec<(SourceId, f64)> = enabled
                .iter()
                .map(|source| (source.descriptor.id.clone(), source.descriptor.weight()))
                .collect();
            allocate(&weights, limit)
                .into_iter()
                .zip(enabled)
                .map(|((id, quota), source)| (id, Arc::clone(&source.adapter), quota))
                .collect()
        };

        if plan.is_empty() {
            warn!(operation, "no enabled sources to query");
            return FanOut {
                items: Vec::new(),
                succeeded: 0,
            };
        }

        debug!(
            operation,
            limit,
            quotas = ?plan.iter().map(|(id, _, quota)| (id.as_str(), *quota)).collect::<Vec<_>>(),
            "fanning out to sources"
        );

        let (ids, tasks): (Vec<SourceId>, Vec<_>) = plan
            .into_iter()
            .map(|(id, adapter, quota)| (id, tokio::spawn(invoke(adapter, quota))))
            .unzip();

        let mut batches = Vec::with_capacity(ids.len());
        for (id, outcome) in ids.into_iter().zip(join_all(tasks).await) {
            match outcome {
                Ok(Ok(items)) => batches.push(items),
                Ok(Err(error)) => warn!(
                    source = %id,
                    operation,
                    code = error.code(),
                    error = %error,
                    "partial source failure"
                ),
                Err(join_error) => warn!(
                    source = %id,
                    operation,
                    error = %join_error,
                    "partial source failure: source task did not complete"
                ),
            }
        }

        FanOut {
            succeeded: batches.len(),
            items: merge(batches),
        }
    }

    fn set_enabled(&self, id: &SourceId, enabled: bool) -> bool {
        let mut sources = self
            .sources
            .write()
            .expect("source registry lock is not poisoned");
        let mut found = false;
        for source in sources.iter_mut().filter(|source| &source.descriptor.id == id) {
            source.descriptor.enabled = enabled;
            found = true;
        }
        if found {
            info!(source = %id, enabled, "source toggled");
        }
        found
    }

    fn read_sources(&self) -> std::sync::RwLockReadGuard<'_, Vec<RegisteredSource>> {
        self.sources
            .read()
            .expect("source registry lock is not poisoned")
    }
}

fn allocate(weights: &[(SourceId, f64)], limit: usize) -> Vec<(SourceId, usize)> {
    if weights.is_empty() {
        return Vec::new();
    }

    let total: f64 = weights.iter().map(|(_, weight)| weight).sum();
    let equal_share = 1.0 / weights.len() as f64;

    weights
        .iter()
        .map(|(id, weight)| {
            let share = if total > 0.0 { weight / total } else { equal_share };
            let quota = (share * limit as f64).round() as usize;
            (id.clone(), quota.max(1))
        })
        .collect()
}

/// Concatenates batches in order, sorts newest first (stable), and keeps the
/// first occurrence of each id.
fn merge(batches: Vec<Vec<NormalizedItem>>) -> Vec<NormalizedItem> {
    let mut items: Vec<NormalizedItem> = batches.into_iter().flatten().collect();
    items.sort_by(|left, right| right.published_at.cmp(&left.published_at));

    let mut seen = HashSet::with_capacity(items.len());
    items.retain(|item| seen.insert(item.id.clone()));
    items
}

/// Assembles an [`Aggregator`] from explicit parts or from a [`FeedConfig`].
#[derive(Default)]
pub struct AggregatorBuilder {
    cache: Option<Arc<Cache>>,
    sources: Vec<(SourceDescriptor, Arc<dyn SourceAdapter>)>,
}

impl AggregatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redis-backed cache plus the bundled adapters over reqwest.
    pub fn from_config(config: &FeedConfig) -> Result<Self, CoreError> {
        Self::from_config_with_http(config, Arc::new(ReqwestHttpClient::new()))
    }

    /// Like [`from_config`](Self::from_config) with a caller-provided HTTP
    /// client shared by every adapter.
    pub fn from_config_with_http(
        config: &FeedConfig,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, CoreError> {
        let cache = Cache::redis(&config.cache)?;
        let mut builder = Self::new().with_cache(Arc::new(cache));

        for settings in &config.sources {
            let descriptor = settings.descriptor()?;
            let adapter = build_adapter(settings, Arc::clone(&http))?;
            builder = builder.with_source(descriptor, adapter);
        }
        Ok(builder)
    }

    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_source(mut self, descriptor: SourceDescriptor, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.sources.push((descriptor, adapter));
        self
    }

    /// Falls back to an in-memory cache when none was given.
    pub fn build(self) -> Aggregator {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(Cache::in_memory(CacheConfig::default())));
        Aggregator::new(cache, self.sources)
    }
}

fn build_adapter(
    settings: &SourceSettings,
    http: Arc<dyn HttpClient>,
) -> Result<Arc<dyn SourceAdapter>, CoreError> {
    let adapter: Arc<dyn SourceAdapter> = match settings.kind {
        SourceKind::NewsApi => Arc::new(NewsApiAdapter::with_http_client(settings, http)?),
        SourceKind::Finnhub => Arc::new(FinnhubAdapter::with_http_client(settings, http)?),
        SourceKind::GNews => Arc::new(GNewsAdapter::with_http_client(settings, http)?),
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> SourceId {
        SourceId::new(value).expect("valid id")
    }

    fn item(id: &str, published_at: &str) -> NormalizedItem {
        NormalizedItem {
            id: id.to_string(),
            source: SourceId::newsapi(),
            title: id.to_string(),
            body: String::new(),
            url: None,
            published_at: UtcDateTime::parse(published_at).expect("valid timestamp"),
            categories: Vec::new(),
            impact: None,
        }
    }

    #[test]
    fn quotas_follow_weights() {
        let quotas = allocate(&[(id("a"), 0.5), (id("b"), 0.3), (id("c"), 0.2)], 10);
        assert_eq!(quotas, vec![(id("a"), 5), (id("b"), 3), (id("c"), 2)]);
    }

    #[test]
    fn quotas_never_drop_below_one() {
        let quotas = allocate(&[(id("a"), 0.9), (id("b"), 0.01)], 10);
        assert_eq!(quotas, vec![(id("a"), 10), (id("b"), 1)]);
    }

    #[test]
    fn zero_weights_share_equally() {
        let quotas = allocate(&[(id("a"), 0.0), (id("b"), 0.0)], 10);
        assert_eq!(quotas, vec![(id("a"), 5), (id("b"), 5)]);
    }

    #[test]
    fn merge_sorts_newest_first_and_keeps_first_duplicate() {
        let mut duplicate = item("x", "2024-03-01T12:00:00Z");
        duplicate.title = String::from("second copy");

        let merged = merge(vec![
            vec![item("old", "2024-03-01T08:00:00Z"), item("x", "2024-03-01T12:00:00Z")],
            vec![duplicate, item("new", "2024-03-02T00:00:00Z")],
        ]);

        let ids: Vec<_> = merged.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "x", "old"]);
        assert_eq!(merged[1].title, "x");
    }

    #[test]
    fn equal_timestamps_keep_registration_order() {
        let merged = merge(vec![
            vec![item("first", "2024-03-01T00:00:00Z")],
            vec![item("second", "2024-03-01T00:00:00Z")],
        ]);
        let ids: Vec<_> = merged.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
