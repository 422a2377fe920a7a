//! Workflows and the context running them.
//!
//! A workflow binds a heap to an engine chain. The context owns every workflow declared by
//! its builder and processes them on demand.

use crate::dao::{NutDao, NutDaoListener};
use crate::engine::{
    ChainSet, Engine, EngineChain, EngineRequest, ExecutionStats, HtmlInspectorEngine,
    InspectorConfig, TextAggregatorEngine,
};
use crate::error::{NutpipeError, Result};
use crate::heap::NutsHeap;
use crate::nut::Nut;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Heap declaration. Nested heaps are registered under their own id as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapDefinition {
    pub id: String,
    /// Provider id; required when `paths` is not empty.
    pub provider: Option<String>,
    pub paths: Vec<String>,
    /// Heaps declared inline.
    pub nested: Vec<HeapDefinition>,
    /// Ids of heaps registered before this one.
    pub heaps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowDefinition {
    pub id: String,
    pub heap: String,
    pub template: Option<String>,
    /// Engine ids layered over the template.
    pub engines: Vec<String>,
    /// Providers receiving the processed nuts.
    pub stores: Vec<String>,
    /// Starts the chain with an HTML inspector and a text aggregator.
    pub default_engines: bool,
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            heap: String::new(),
            template: None,
            engines: Vec::new(),
            stores: Vec::new(),
            default_engines: true,
        }
    }
}

pub struct Workflow {
    id: String,
    heap: Arc<NutsHeap>,
    chain: EngineChain,
    chains: Arc<ChainSet>,
    stores: Vec<Arc<dyn NutDao>>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, heap: Arc<NutsHeap>, chain: EngineChain) -> Self {
        let chains = Arc::new(ChainSet::from_chain(&chain));
        Self {
            id: id.into(),
            heap,
            chain,
            chains,
            stores: Vec::new(),
        }
    }

    pub fn with_stores(mut self, stores: Vec<Arc<dyn NutDao>>) -> Self {
        self.stores = stores;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn heap(&self) -> &Arc<NutsHeap> {
        &self.heap
    }

    pub fn chain(&self) -> &EngineChain {
        &self.chain
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("heap", &self.heap.id())
            .field("chain", &self.chain.kinds())
            .field("stores", &self.stores.len())
            .finish()
    }
}

/// Result of one workflow execution.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub nuts: Vec<Arc<Nut>>,
    pub heap_resolution: Duration,
    pub chain_execution: Duration,
    /// Engines in the order they started, with the time spent downstream of each.
    pub engines: Vec<(&'static str, Duration)>,
}

pub struct Context {
    context_path: String,
    workflows: IndexMap<String, Workflow>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn workflow(&self, id: &str) -> Result<&Workflow> {
        self.workflows
            .get(id)
            .ok_or_else(|| NutpipeError::not_found(format!("workflow '{id}'")))
    }

    pub fn workflow_ids(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    pub fn process(&self, workflow_id: &str) -> Result<Vec<Arc<Nut>>> {
        Ok(self.process_with_stats(workflow_id)?.nuts)
    }

    pub fn process_with_stats(&self, workflow_id: &str) -> Result<ProcessOutcome> {
        let workflow = self.workflow(workflow_id)?;

        let start = Instant::now();
        let nuts = workflow.heap.resolve()?;
        let heap_resolution = start.elapsed();

        let stats = Arc::new(ExecutionStats::default());
        let request = EngineRequest::builder(workflow_id, workflow.heap.clone())
            .context_path(self.context_path.clone())
            .nuts(nuts)
            .chains(workflow.chains.clone())
            .stats(stats.clone())
            .build();

        let start = Instant::now();
        let nuts = workflow.chains.run(&request)?;
        let chain_execution = start.elapsed();
        info!(
            "Workflow '{}': {} nut(s), heap resolved in {:?}, chain executed in {:?}",
            workflow_id,
            nuts.len(),
            heap_resolution,
            chain_execution
        );

        self.persist(workflow, &nuts)?;
        Ok(ProcessOutcome {
            nuts,
            heap_resolution,
            chain_execution,
            engines: stats.timings(),
        })
    }

    /// Registers `listener` on every path of the workflow's heap.
    pub fn observe(&self, workflow_id: &str, listener: &Arc<dyn NutDaoListener>) -> Result<()> {
        self.workflow(workflow_id)?.heap.observe(listener)
    }

    fn persist(&self, workflow: &Workflow, nuts: &[Arc<Nut>]) -> Result<()> {
        for store in workflow.stores.iter().filter(|s| s.save_supported()) {
            let saved = save_all(store.as_ref(), nuts)?;
            debug!("Workflow '{}': saved {} nut(s)", workflow.id, saved);
        }
        Ok(())
    }
}

/// Saves `nuts` and every nut they reference into `store`, each name once. Returns how
/// many nuts were written.
pub fn save_all(store: &dyn NutDao, nuts: &[Arc<Nut>]) -> Result<usize> {
    let mut saved = HashSet::new();
    for nut in nuts {
        save_tree(store, nut, &mut saved)?;
    }
    Ok(saved.len())
}

fn save_tree(store: &dyn NutDao, nut: &Arc<Nut>, saved: &mut HashSet<String>) -> Result<()> {
    if !saved.insert(nut.name().to_string()) {
        return Ok(());
    }
    store.save(nut)?;
    for referenced in nut.referenced_nuts() {
        save_tree(store, &referenced, saved)?;
    }
    Ok(())
}

/// Collects providers, engines, heaps and workflows, then wires them in [`ContextBuilder::build`].
pub struct ContextBuilder {
    context_path: String,
    providers: IndexMap<String, Arc<dyn NutDao>>,
    engines: IndexMap<String, Arc<dyn Engine>>,
    heaps: Vec<HeapDefinition>,
    templates: IndexMap<String, Vec<String>>,
    workflows: Vec<WorkflowDefinition>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            context_path: String::new(),
            providers: IndexMap::new(),
            engines: IndexMap::new(),
            heaps: Vec::new(),
            templates: IndexMap::new(),
            workflows: Vec::new(),
        }
    }

    pub fn context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn with_provider(mut self, id: impl Into<String>, dao: Arc<dyn NutDao>) -> Self {
        self.providers.insert(id.into(), dao);
        self
    }

    pub fn with_engine(mut self, id: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        self.engines.insert(id.into(), engine);
        self
    }

    pub fn with_heap(mut self, heap: HeapDefinition) -> Self {
        self.heaps.push(heap);
        self
    }

    /// Named list of engine ids that workflows can start from.
    pub fn with_template(mut self, id: impl Into<String>, engines: Vec<String>) -> Self {
        self.templates.insert(id.into(), engines);
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.workflows.push(workflow);
        self
    }

    pub fn build(self) -> Result<Context> {
        let mut heaps: IndexMap<String, Arc<NutsHeap>> = IndexMap::new();
        for definition in &self.heaps {
            self.register_heap(definition, &mut heaps)?;
        }

        let defaults = EngineChain::new([
            Arc::new(HtmlInspectorEngine::new(InspectorConfig::default())?) as Arc<dyn Engine>,
            Arc::new(TextAggregatorEngine::default()),
        ]);

        let mut workflows = IndexMap::new();
        for definition in &self.workflows {
            if workflows.contains_key(&definition.id) {
                return Err(NutpipeError::bad_argument(format!(
                    "workflow '{}' declared twice",
                    definition.id
                )));
            }
            let heap = heaps.get(&definition.heap).cloned().ok_or_else(|| {
                NutpipeError::not_found(format!(
                    "heap '{}' of workflow '{}'",
                    definition.heap, definition.id
                ))
            })?;

            let template = match &definition.template {
                Some(id) => {
                    let ids = self
                        .templates
                        .get(id)
                        .ok_or_else(|| NutpipeError::not_found(format!("template '{id}'")))?;
                    self.chain_of(ids)?
                }
                None => EngineChain::default(),
            };
            let own = self.chain_of(&definition.engines)?;
            let base = if definition.default_engines {
                defaults.clone()
            } else {
                EngineChain::default()
            };
            let chain = EngineChain::of([base, template, own]);

            let stores = definition
                .stores
                .iter()
                .map(|id| self.provider(id))
                .collect::<Result<Vec<_>>>()?;
            for (id, store) in definition.stores.iter().zip(&stores) {
                if !store.save_supported() {
                    warn!("Store '{}' of workflow '{}' is read-only", id, definition.id);
                }
            }

            debug!("Workflow '{}' chain: {:?}", definition.id, chain.kinds());
            workflows.insert(
                definition.id.clone(),
                Workflow::new(definition.id.clone(), heap, chain).with_stores(stores),
            );
        }

        info!(
            "Context built: {} provider(s), {} heap(s), {} workflow(s)",
            self.providers.len(),
            heaps.len(),
            workflows.len()
        );
        Ok(Context {
            context_path: self.context_path,
            workflows,
        })
    }

    fn provider(&self, id: &str) -> Result<Arc<dyn NutDao>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| NutpipeError::not_found(format!("provider '{id}'")))
    }

    fn chain_of(&self, ids: &[String]) -> Result<EngineChain> {
        let engines = ids
            .iter()
            .map(|id| {
                self.engines
                    .get(id)
                    .cloned()
                    .ok_or_else(|| NutpipeError::not_found(format!("engine '{id}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(EngineChain::new(engines))
    }

    fn register_heap(
        &self,
        definition: &HeapDefinition,
        heaps: &mut IndexMap<String, Arc<NutsHeap>>,
    ) -> Result<Arc<NutsHeap>> {
        if definition.id.is_empty() {
            return Err(NutpipeError::bad_argument("heap without id"));
        }
        if heaps.contains_key(&definition.id) {
            return Err(NutpipeError::bad_argument(format!(
                "heap '{}' declared twice",
                definition.id
            )));
        }

        let mut composition = Vec::new();
        for nested in &definition.nested {
            composition.push(self.register_heap(nested, heaps)?);
        }
        for id in &definition.heaps {
            let heap = heaps.get(id).cloned().ok_or_else(|| {
                NutpipeError::not_found(format!("heap '{id}' referenced by '{}'", definition.id))
            })?;
            composition.push(heap);
        }

        let dao = definition
            .provider
            .as_deref()
            .map(|id| self.provider(id))
            .transpose()?;
        let heap = Arc::new(NutsHeap::new(
            definition.id.clone(),
            dao,
            definition.paths.clone(),
            composition,
        )?);
        heaps.insert(definition.id.clone(), heap.clone());
        Ok(heap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::DiskNutDao;
    use crate::engine::{GzipConfig, GzipEngine};
    use crate::error::ErrorKind;
    use crate::nut::NutType;
    use std::fs;
    use tempfile::tempdir;

    fn fixture() -> (tempfile::TempDir, Arc<dyn NutDao>) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.js"), "var a;").unwrap();
        fs::write(dir.path().join("b.js"), "var b;").unwrap();
        fs::write(dir.path().join("c.css"), "c{}").unwrap();
        let dao: Arc<dyn NutDao> = DiskNutDao::at(dir.path()).unwrap();
        (dir, dao)
    }

    fn heap(id: &str, paths: &[&str]) -> HeapDefinition {
        HeapDefinition {
            id: id.to_string(),
            provider: Some("disk".to_string()),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_process_aggregates_by_type() {
        let (_dir, dao) = fixture();
        let context = Context::builder()
            .with_provider("disk", dao)
            .with_heap(heap("scripts", &["a.js", "b.js"]))
            .with_workflow(WorkflowDefinition {
                id: "wf".into(),
                heap: "scripts".into(),
                ..Default::default()
            })
            .build()
            .unwrap();

        let outcome = context.process_with_stats("wf").unwrap();
        assert_eq!(outcome.nuts.len(), 1);
        assert_eq!(outcome.nuts[0].name(), "aggregate.js");
        assert_eq!(outcome.nuts[0].read_string().unwrap(), "var a;\r\nvar b;");
        assert_eq!(outcome.engines.len(), 1);
        assert_eq!(outcome.engines[0].0, "text-aggregator");

        let again = context.process("wf").unwrap();
        assert_eq!(again[0].read_bytes().unwrap(), outcome.nuts[0].read_bytes().unwrap());
    }

    #[test]
    fn test_unknown_workflow_is_not_found() {
        let context = Context::builder().build().unwrap();
        assert_eq!(context.process("nope").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_nested_heaps_registered_and_references_checked() {
        let (_dir, dao) = fixture();
        let mut outer = heap("outer", &["c.css"]);
        outer.nested = vec![heap("inner", &["a.js"])];
        let context = Context::builder()
            .with_provider("disk", dao.clone())
            .with_heap(outer)
            .with_workflow(WorkflowDefinition {
                id: "inner-only".into(),
                heap: "inner".into(),
                default_engines: false,
                ..Default::default()
            })
            .build()
            .unwrap();
        let nuts = context.process("inner-only").unwrap();
        assert_eq!(nuts.len(), 1);
        assert_eq!(nuts[0].name(), "a.js");

        let mut dangling = heap("dangling", &[]);
        dangling.heaps = vec!["later".into()];
        let err = Context::builder()
            .with_provider("disk", dao)
            .with_heap(dangling)
            .with_heap(heap("later", &["a.js"]))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_template_and_stores() {
        let (_dir, dao) = fixture();
        let out = tempdir().unwrap();
        let store: Arc<dyn NutDao> = DiskNutDao::at(out.path()).unwrap();
        let context = Context::builder()
            .with_provider("disk", dao)
            .with_provider("out", store)
            .with_engine("gzip", Arc::new(GzipEngine::new(GzipConfig::default())))
            .with_template("compressing", vec!["gzip".into()])
            .with_heap(heap("styles", &["c.css"]))
            .with_workflow(WorkflowDefinition {
                id: "wf".into(),
                heap: "styles".into(),
                template: Some("compressing".into()),
                stores: vec!["out".into()],
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_eq!(
            context.workflow("wf").unwrap().chain().kinds(),
            vec!["html-inspector", "text-aggregator", "gzip"]
        );
        let nuts = context.process("wf").unwrap();
        assert!(nuts[0].is_compressed());
        let saved = fs::read(out.path().join("aggregate.css")).unwrap();
        assert_eq!(saved, nuts[0].read_bytes().unwrap());
    }

    #[test]
    fn test_save_all_writes_each_name_once() {
        let out = tempdir().unwrap();
        let store = DiskNutDao::at(out.path()).unwrap();
        let shared = Nut::from_bytes("css/shared.css", NutType::Css, b"s{}".to_vec());
        let first = Nut::from_bytes("a.html", NutType::Html, b"<a>".to_vec());
        let second = Nut::from_bytes("b.html", NutType::Html, b"<b>".to_vec());
        first.add_referenced_nut(shared.clone());
        second.add_referenced_nut(shared);

        assert_eq!(save_all(store.as_ref(), &[first, second]).unwrap(), 3);
        assert_eq!(fs::read_to_string(out.path().join("css/shared.css")).unwrap(), "s{}");
        assert!(out.path().join("b.html").is_file());
    }
}
