use super::EngineType;
use super::chain::ChainSet;
use crate::heap::NutsHeap;
use crate::nut::{Combiner, Nut};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Engines that ran during one execution, in the order they started, with the time spent
/// in each (downstream engines included). Shared by sub-requests.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    engines: Mutex<Vec<(&'static str, Duration)>>,
}

impl ExecutionStats {
    /// Records that `kind` started; returns the slot to pass to [`ExecutionStats::finish`].
    pub fn begin(&self, kind: &'static str) -> usize {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        engines.push((kind, Duration::ZERO));
        engines.len() - 1
    }

    pub fn finish(&self, slot: usize, elapsed: Duration) {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = engines.get_mut(slot) {
            entry.1 = elapsed;
        }
    }

    pub fn engines(&self) -> Vec<&'static str> {
        self.timings().into_iter().map(|(kind, _)| kind).collect()
    }

    pub fn timings(&self) -> Vec<(&'static str, Duration)> {
        self.engines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything an engine needs to process a list of nuts.
#[derive(Clone)]
pub struct EngineRequest {
    workflow_id: String,
    context_path: String,
    nuts: Vec<Arc<Nut>>,
    heap: Arc<NutsHeap>,
    skip: HashSet<EngineType>,
    chains: Arc<ChainSet>,
    combiner: Arc<Combiner>,
    stats: Arc<ExecutionStats>,
}

impl EngineRequest {
    pub fn builder(workflow_id: impl Into<String>, heap: Arc<NutsHeap>) -> EngineRequestBuilder {
        EngineRequestBuilder {
            workflow_id: workflow_id.into(),
            context_path: String::new(),
            nuts: Vec::new(),
            heap,
            skip: HashSet::new(),
            chains: Arc::new(ChainSet::default()),
            stats: Arc::new(ExecutionStats::default()),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn nuts(&self) -> &[Arc<Nut>] {
        &self.nuts
    }

    pub fn heap(&self) -> &Arc<NutsHeap> {
        &self.heap
    }

    pub fn skips(&self, category: EngineType) -> bool {
        self.skip.contains(&category)
    }

    pub fn chains(&self) -> &Arc<ChainSet> {
        &self.chains
    }

    pub fn combiner(&self) -> &Combiner {
        &self.combiner
    }

    pub fn stats(&self) -> &Arc<ExecutionStats> {
        &self.stats
    }

    /// Same request over other nuts.
    pub fn with_nuts(&self, nuts: Vec<Arc<Nut>>) -> EngineRequest {
        EngineRequest {
            nuts,
            ..self.clone()
        }
    }

    /// Sub-request over another heap, sharing chains and stats but with its own
    /// merging context and extra skipped categories.
    pub fn nested(
        &self,
        heap: Arc<NutsHeap>,
        nuts: Vec<Arc<Nut>>,
        skip: impl IntoIterator<Item = EngineType>,
    ) -> EngineRequest {
        let mut skipped = self.skip.clone();
        skipped.extend(skip);
        EngineRequest {
            heap,
            nuts,
            skip: skipped,
            combiner: Arc::new(Combiner::new()),
            ..self.clone()
        }
    }

    /// Key identifying this request's input for caching.
    pub fn cache_key(&self) -> String {
        let names: Vec<&str> = self.nuts.iter().map(|n| n.name()).collect();
        format!("{}|{}", self.workflow_id, names.join(","))
    }
}

pub struct EngineRequestBuilder {
    workflow_id: String,
    context_path: String,
    nuts: Vec<Arc<Nut>>,
    heap: Arc<NutsHeap>,
    skip: HashSet<EngineType>,
    chains: Arc<ChainSet>,
    stats: Arc<ExecutionStats>,
}

impl EngineRequestBuilder {
    pub fn context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn nuts(mut self, nuts: Vec<Arc<Nut>>) -> Self {
        self.nuts = nuts;
        self
    }

    pub fn skip(mut self, category: EngineType) -> Self {
        self.skip.insert(category);
        self
    }

    pub fn chains(mut self, chains: Arc<ChainSet>) -> Self {
        self.chains = chains;
        self
    }

    pub fn stats(mut self, stats: Arc<ExecutionStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn build(self) -> EngineRequest {
        EngineRequest {
            workflow_id: self.workflow_id,
            context_path: self.context_path,
            nuts: self.nuts,
            heap: self.heap,
            skip: self.skip,
            chains: self.chains,
            combiner: Arc::new(Combiner::new()),
            stats: self.stats,
        }
    }
}
