use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::Serialize;

use crate::cache::{CacheError, EntityType};

/// Per-entity-type cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

/// Counter registry scoped to one `Cache` instance.
#[derive(Debug, Default)]
pub(crate) struct StatsRegistry {
    inner: Mutex<HashMap<EntityType, CacheStats>>,
}

impl StatsRegistry {
    pub(crate) fn record_hit(&self, entity: EntityType) {
        self.update(entity, |stats| stats.hits += 1);
    }

    pub(crate) fn record_miss(&self, entity: EntityType) {
        self.update(entity, |stats| stats.misses += 1);
    }

    pub(crate) fn record_error(&self, entity: EntityType, error: &CacheError) {
        let message = error.to_string();
        self.update(entity, move |stats| {
            stats.errors += 1;
            stats.last_error = Some(message);
        });
    }

    pub(crate) fn snapshot(&self, entity: EntityType) -> CacheStats {
        self.lock().get(&entity).cloned().unwrap_or_default()
    }

    pub(crate) fn all(&self) -> BTreeMap<EntityType, CacheStats> {
        let inner = self.lock();
        EntityType::ALL
            .into_iter()
            .map(|entity| (entity, inner.get(&entity).cloned().unwrap_or_default()))
            .collect()
    }

    pub(crate) fn reset(&self) {
        self.lock().clear();
    }

    fn update(&self, entity: EntityType, apply: impl FnOnce(&mut CacheStats)) {
        apply(self.lock().entry(entity).or_default());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EntityType, CacheStats>> {
        self.inner
            .lock()
            .expect("cache stats lock is not poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_tracked_per_type() {
        let registry = StatsRegistry::default();

        registry.record_hit(EntityType::News);
        registry.record_hit(EntityType::News);
        registry.record_miss(EntityType::Search);
        registry.record_error(
            EntityType::Search,
            &CacheError::Backend(String::from("connection refused")),
        );

        let news = registry.snapshot(EntityType::News);
        let search = registry.snapshot(EntityType::Search);
        assert_eq!((news.hits, news.misses, news.errors), (2, 0, 0));
        assert_eq!((search.hits, search.misses, search.errors), (0, 1, 1));
        assert_eq!(
            search.last_error.as_deref(),
            Some("cache backend error: connection refused")
        );
        assert_eq!(news.hit_rate(), 1.0);
    }

    #[test]
    fn reset_clears_every_type() {
        let registry = StatsRegistry::default();
        registry.record_miss(EntityType::Trending);

        registry.reset();

        assert_eq!(registry.snapshot(EntityType::Trending), CacheStats::default());
        assert_eq!(registry.all().len(), EntityType::ALL.len());
    }
}
