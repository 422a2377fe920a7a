use crate::dao::{
    ClasspathDaoConfig, ClasspathNutDao, DiskDaoConfig, DiskNutDao, HttpDaoConfig, HttpNutDao,
    NutDao,
};
use crate::engine::{
    AggregatorConfig, CacheConfig, Engine, GzipConfig, GzipEngine, HtmlInspectorEngine,
    InspectorConfig, MemoryCacheEngine, TextAggregatorEngine,
};
use crate::error::{NutpipeError, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub type Properties = Map<String, Value>;

pub type ProviderFactory = Box<dyn Fn(&Properties) -> Result<Arc<dyn NutDao>> + Send + Sync>;
pub type EngineFactory = Box<dyn Fn(&Properties) -> Result<Arc<dyn Engine>> + Send + Sync>;

/// Deserializes a property map into a typed option struct.
pub fn options<T: DeserializeOwned>(properties: &Properties) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(properties.clone()))?)
}

/// Factories for providers and engines, keyed by the `type` used in configuration files.
#[derive(Default)]
pub struct ObjectRegistry {
    providers: HashMap<String, ProviderFactory>,
    engines: HashMap<String, EngineFactory>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry knowing every provider and engine shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let providers: [(&str, ProviderFactory); 3] = [
            ("disk", Box::new(disk)),
            ("classpath", Box::new(classpath)),
            ("http", Box::new(http)),
        ];
        for (id, factory) in providers {
            registry.providers.insert(id.to_string(), factory);
        }

        let engines: [(&str, EngineFactory); 4] = [
            ("gzip", Box::new(gzip)),
            ("text-aggregator", Box::new(text_aggregator)),
            ("html-inspector", Box::new(html_inspector)),
            ("memory-cache", Box::new(memory_cache)),
        ];
        for (id, factory) in engines {
            registry.engines.insert(id.to_string(), factory);
        }
        registry
    }

    pub fn register_provider(&mut self, id: &str, factory: ProviderFactory) -> Result<()> {
        check_id(id, self.providers.contains_key(id))?;
        self.providers.insert(id.to_string(), factory);
        Ok(())
    }

    pub fn register_engine(&mut self, id: &str, factory: EngineFactory) -> Result<()> {
        check_id(id, self.engines.contains_key(id))?;
        self.engines.insert(id.to_string(), factory);
        Ok(())
    }

    pub fn create_provider(&self, id: &str, properties: &Properties) -> Result<Arc<dyn NutDao>> {
        let factory = self
            .providers
            .get(id)
            .ok_or_else(|| NutpipeError::not_found(format!("provider type '{id}'")))?;
        factory(properties)
    }

    pub fn create_engine(&self, id: &str, properties: &Properties) -> Result<Arc<dyn Engine>> {
        let factory = self
            .engines
            .get(id)
            .ok_or_else(|| NutpipeError::not_found(format!("engine type '{id}'")))?;
        factory(properties)
    }

    pub fn provider_types(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn engine_types(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

fn disk(properties: &Properties) -> Result<Arc<dyn NutDao>> {
    Ok(DiskNutDao::new(options::<DiskDaoConfig>(properties)?)? as Arc<dyn NutDao>)
}

fn classpath(properties: &Properties) -> Result<Arc<dyn NutDao>> {
    Ok(ClasspathNutDao::new(options::<ClasspathDaoConfig>(properties)?)? as Arc<dyn NutDao>)
}

fn http(properties: &Properties) -> Result<Arc<dyn NutDao>> {
    Ok(HttpNutDao::new(options::<HttpDaoConfig>(properties)?)? as Arc<dyn NutDao>)
}

fn gzip(properties: &Properties) -> Result<Arc<dyn Engine>> {
    Ok(Arc::new(GzipEngine::new(options::<GzipConfig>(properties)?)))
}

fn text_aggregator(properties: &Properties) -> Result<Arc<dyn Engine>> {
    Ok(Arc::new(TextAggregatorEngine::new(options::<AggregatorConfig>(properties)?)))
}

fn html_inspector(properties: &Properties) -> Result<Arc<dyn Engine>> {
    Ok(Arc::new(HtmlInspectorEngine::new(options::<InspectorConfig>(properties)?)?))
}

fn memory_cache(properties: &Properties) -> Result<Arc<dyn Engine>> {
    Ok(Arc::new(MemoryCacheEngine::new(options::<CacheConfig>(properties)?)))
}

fn check_id(id: &str, taken: bool) -> Result<()> {
    if id.trim().is_empty() {
        return Err(NutpipeError::bad_argument("factory id must not be empty"));
    }
    if taken {
        return Err(NutpipeError::bad_argument(format!("'{id}' is already registered")));
    }
    Ok(())
}
