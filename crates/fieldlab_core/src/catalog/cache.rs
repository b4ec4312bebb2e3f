//! TTL cache for catalog snapshots.
//!
//! # Invariants
//! - A snapshot older than `ttl` is never served.
//! - `invalidate()` makes the next `snapshot()` reload from the source.
//! - Loading happens outside the lock; concurrent misses may both load.
//! - A load that overlaps an `invalidate()` is returned to its caller but
//!   never cached.

use super::{AttributeCatalog, CatalogSource};
use crate::repo::RepoResult;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

struct CachedCatalog {
    loaded_at: Instant,
    catalog: Arc<AttributeCatalog>,
}

/// Process-wide catalog cache with explicit refresh contract.
pub struct CatalogCache {
    ttl: Duration,
    slot: RwLock<Option<CachedCatalog>>,
    /// Bumped by every `invalidate()`, under the slot's write lock.
    generation: AtomicU64,
}

impl CatalogCache {
    /// Creates an empty cache. `Duration::ZERO` reloads on every request.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a fresh snapshot, loading from `source` on miss or expiry.
    pub fn snapshot(&self, source: &dyn CatalogSource) -> RepoResult<Arc<AttributeCatalog>> {
        if let Some(catalog) = self.fresh() {
            return Ok(catalog);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let started_at = Instant::now();
        let catalog = Arc::new(AttributeCatalog::new(source.load_definitions()?));
        info!(
            "event=catalog_load module=catalog status=ok definitions={} duration_ms={}",
            catalog.len(),
            started_at.elapsed().as_millis()
        );

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) == generation {
            *slot = Some(CachedCatalog {
                loaded_at: Instant::now(),
                catalog: Arc::clone(&catalog),
            });
        } else {
            info!("event=catalog_load module=catalog status=discarded reason=invalidated");
        }
        Ok(catalog)
    }

    /// Drops the cached snapshot; call after any definition change.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        if slot.take().is_some() {
            info!("event=catalog_invalidate module=catalog status=ok");
        }
    }

    /// Whether a non-expired snapshot is currently cached.
    pub fn is_loaded(&self) -> bool {
        self.fresh().is_some()
    }

    fn fresh(&self) -> Option<Arc<AttributeCatalog>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .filter(|cached| cached.loaded_at.elapsed() < self.ttl)
            .map(|cached| Arc::clone(&cached.catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogCache;
    use crate::model::attribute::{AttributeDefinition, NewAttributeDefinition, ValueType};
    use std::time::Duration;

    #[test]
    fn fixed_source_snapshot_is_shared_until_invalidated() {
        let source = vec![AttributeDefinition::new(NewAttributeDefinition::new(
            "Score",
            "score__c",
            ValueType::Number,
        ))
        .unwrap()];
        let cache = CatalogCache::new(Duration::from_secs(60));

        let first = cache.snapshot(&source).unwrap();
        assert!(first.resolve("score__c").is_some());
        assert!(std::sync::Arc::ptr_eq(&first, &cache.snapshot(&source).unwrap()));

        cache.invalidate();
        assert!(!std::sync::Arc::ptr_eq(&first, &cache.snapshot(&source).unwrap()));
        assert_eq!(cache.ttl(), Duration::from_secs(60));
    }
}
