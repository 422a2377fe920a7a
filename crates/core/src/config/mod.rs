//! JSON configuration.
//!
//! ```json
//! {
//!   "context_path": "/static",
//!   "providers": [{ "id": "site", "type": "disk", "properties": { "base_dir": "web", "wildcard": true } }],
//!   "engines":   [{ "id": "gz", "type": "gzip", "properties": { "level": 9 } }],
//!   "heaps":     [{ "id": "scripts", "provider": "site", "paths": ["js/*.js"] }],
//!   "templates": [{ "id": "prod", "engines": ["gz"] }],
//!   "workflows": [{ "id": "app", "heap": "scripts", "template": "prod" }]
//! }
//! ```

mod registry;

pub use registry::{EngineFactory, ObjectRegistry, Properties, ProviderFactory, options};

use crate::context::{ContextBuilder, HeapDefinition, WorkflowDefinition};
use crate::error::{NutpipeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A provider or engine instance: the factory `type` and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub id: String,
    #[serde(default)]
    pub engines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub context_path: String,
    pub providers: Vec<ComponentConfig>,
    pub engines: Vec<ComponentConfig>,
    pub heaps: Vec<HeapDefinition>,
    pub templates: Vec<TemplateConfig>,
    pub workflows: Vec<WorkflowDefinition>,
}

impl ContextConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NutpipeError::from_io(e, &path.display().to_string()))?;
        debug!("Loading configuration from {}", path.display());
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

impl ContextBuilder {
    /// Instantiates every provider and engine of `config` through `registry`.
    pub fn from_config(config: &ContextConfig, registry: &ObjectRegistry) -> Result<Self> {
        let mut builder = ContextBuilder::new().context_path(config.context_path.clone());
        for provider in &config.providers {
            let dao = registry.create_provider(&provider.kind, &provider.properties)?;
            builder = builder.with_provider(provider.id.clone(), dao);
        }
        for engine in &config.engines {
            let instance = registry.create_engine(&engine.kind, &engine.properties)?;
            builder = builder.with_engine(engine.id.clone(), instance);
        }
        for template in &config.templates {
            builder = builder.with_template(template.id.clone(), template.engines.clone());
        }
        for heap in &config.heaps {
            builder = builder.with_heap(heap.clone());
        }
        for workflow in &config.workflows {
            builder = builder.with_workflow(workflow.clone());
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_context_from_json() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/a.css"), "a{}").unwrap();
        fs::write(dir.path().join("css/b.css"), "b{}").unwrap();
        let json = serde_json::json!({
            "providers": [{
                "id": "site",
                "type": "disk",
                "properties": { "base_dir": dir.path(), "wildcard": true }
            }],
            "engines": [{ "id": "gz", "type": "gzip", "properties": { "compress": false } }],
            "heaps": [{ "id": "styles", "provider": "site", "paths": ["css/*.css"] }],
            "templates": [{ "id": "prod", "engines": ["gz"] }],
            "workflows": [{ "id": "app", "heap": "styles", "template": "prod" }]
        });

        let config = ContextConfig::from_json_str(&json.to_string()).unwrap();
        let context = ContextBuilder::from_config(&config, &ObjectRegistry::with_builtins())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(context.workflow_ids(), vec!["app"]);

        let nuts = context.process("app").unwrap();
        assert_eq!(nuts.len(), 1);
        assert!(!nuts[0].is_compressed());
        assert_eq!(nuts[0].read_string().unwrap(), "a{}\r\nb{}");
    }

    #[test]
    fn test_unknown_type_and_missing_file() {
        let config = ContextConfig::from_json_str(
            r#"{ "providers": [{ "id": "x", "type": "ftp" }] }"#,
        )
        .unwrap();
        let err = ContextBuilder::from_config(&config, &ObjectRegistry::with_builtins())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = ContextConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            ContextConfig::from_json_str("{ nope").unwrap_err().kind(),
            ErrorKind::BadArgument
        );
    }
}
