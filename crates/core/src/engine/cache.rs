use super::{Engine, EngineRequest, EngineType, Next};
use crate::dao::NutDaoListener;
use crate::error::Result;
use crate::nut::{Nut, NutType};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { cache: true }
    }
}

/// Where processed results are kept between requests.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<Arc<Nut>>>;
    fn put(&self, key: String, nuts: Vec<Arc<Nut>>);
    fn remove(&self, key: &str) -> bool;
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Vec<Arc<Nut>>>,
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<Vec<Arc<Nut>>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    fn put(&self, key: String, nuts: Vec<Arc<Nut>>) {
        self.entries.insert(key, nuts);
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Evicts one cache entry as soon as any path of the heap it was computed from changes.
pub struct CacheInvalidator {
    key: String,
    store: Weak<dyn CacheStore>,
}

impl CacheInvalidator {
    pub fn new(key: impl Into<String>, store: &Arc<dyn CacheStore>) -> Self {
        Self {
            key: key.into(),
            store: Arc::downgrade(store),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl NutDaoListener for CacheInvalidator {
    fn polling(&self, _pattern: &str, _paths: &HashSet<String>) -> bool {
        self.store.strong_count() > 0
    }

    fn nut_polled(&self, path: &str, _marker: u64) -> bool {
        if let Some(store) = self.store.upgrade() {
            if store.remove(&self.key) {
                info!("'{}' changed, evicted cache entry '{}'", path, self.key);
            }
        }
        // One eviction per cycle is enough.
        false
    }

    fn is_alive(&self) -> bool {
        self.store.strong_count() > 0
    }
}

/// Short-circuits the rest of the chain when a result is already cached.
pub struct MemoryCacheEngine {
    enabled: bool,
    store: Arc<dyn CacheStore>,
    invalidators: DashMap<String, Arc<CacheInvalidator>>,
}

impl MemoryCacheEngine {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryCacheStore::default()))
    }

    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            enabled: config.cache,
            store,
            invalidators: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    fn watch(&self, request: &EngineRequest, key: &str) {
        if self.invalidators.contains_key(key) {
            return;
        }
        let invalidator = Arc::new(CacheInvalidator::new(key, &self.store));
        let listener: Arc<dyn NutDaoListener> = invalidator.clone();
        match request.heap().observe(&listener) {
            Ok(()) => {
                self.invalidators.insert(key.to_string(), invalidator);
            }
            Err(e) => warn!("Cache entry '{}' will not be invalidated: {}", key, e),
        }
    }
}

impl Default for MemoryCacheEngine {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Engine for MemoryCacheEngine {
    fn kind(&self) -> &'static str {
        "memory-cache"
    }

    fn category(&self) -> EngineType {
        EngineType::Cache
    }

    fn applicable_types(&self) -> &[NutType] {
        &NutType::ALL
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn process(&self, request: &EngineRequest, next: Next<'_>) -> Result<Vec<Arc<Nut>>> {
        let key = request.cache_key();
        if let Some(hit) = self.store.get(&key) {
            debug!("Cache hit for '{}'", key);
            return Ok(hit);
        }

        let processed = next.process(request)?;
        if !processed.iter().all(|n| n.is_cacheable()) {
            return Ok(processed);
        }
        let materialized = processed
            .iter()
            .map(|n| n.materialize())
            .collect::<Result<Vec<_>>>()?;
        self.store.put(key.clone(), materialized.clone());
        self.watch(request, &key);
        Ok(materialized)
    }
}
