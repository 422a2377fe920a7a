use super::request::EngineRequest;
use super::{Engine, EngineType};
use crate::error::Result;
use crate::nut::{Nut, NutType};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Immutable, ordered and deduplicated list of engines.
///
/// Engines are sorted by category (stable). When several engines share a kind, the one
/// supplied last takes the slot of the first occurrence.
#[derive(Clone)]
pub struct EngineChain {
    engines: Arc<[Arc<dyn Engine>]>,
}

impl Default for EngineChain {
    fn default() -> Self {
        Self {
            engines: Arc::from(Vec::new()),
        }
    }
}

impl EngineChain {
    pub fn new(engines: impl IntoIterator<Item = Arc<dyn Engine>>) -> Self {
        let mut sorted: Vec<Arc<dyn Engine>> = engines.into_iter().collect();
        sorted.sort_by_key(|e| e.category());

        let mut slots: IndexMap<&'static str, Arc<dyn Engine>> = IndexMap::new();
        for engine in sorted {
            match slots.get_mut(engine.kind()) {
                Some(slot) => *slot = engine,
                None => {
                    slots.insert(engine.kind(), engine);
                }
            }
        }

        Self {
            engines: slots.into_values().collect::<Vec<_>>().into(),
        }
    }

    /// Layers `incoming` over `existing`.
    pub fn combine(existing: &EngineChain, incoming: &EngineChain) -> EngineChain {
        EngineChain::new(existing.engines.iter().chain(incoming.engines.iter()).cloned())
    }

    /// Combines every part, later parts overriding earlier ones.
    pub fn of(parts: impl IntoIterator<Item = EngineChain>) -> EngineChain {
        EngineChain::new(parts.into_iter().flat_map(|c| c.engines.to_vec()))
    }

    pub fn engines(&self) -> &[Arc<dyn Engine>] {
        &self.engines
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.kind()).collect()
    }

    pub fn head(&self) -> Option<ChainNode<'_>> {
        if self.engines.is_empty() {
            None
        } else {
            Some(ChainNode {
                chain: self,
                index: 0,
            })
        }
    }

    /// Engines applicable to `nut_type`, order preserved.
    pub fn for_type(&self, nut_type: NutType) -> EngineChain {
        Self {
            engines: self
                .engines
                .iter()
                .filter(|e| e.applicable_types().contains(&nut_type))
                .cloned()
                .collect::<Vec<_>>()
                .into(),
        }
    }

    pub fn contains(&self, category: EngineType) -> bool {
        self.engines.iter().any(|e| e.category() == category)
    }

    pub fn process(&self, request: &EngineRequest) -> Result<Vec<Arc<Nut>>> {
        Next {
            remaining: &self.engines,
        }
        .process(request)
    }
}

impl From<Arc<dyn Engine>> for EngineChain {
    fn from(engine: Arc<dyn Engine>) -> Self {
        EngineChain::new([engine])
    }
}

impl std::fmt::Debug for EngineChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.engines.iter()).finish()
    }
}

/// Read-only cursor over a chain.
#[derive(Clone, Copy)]
pub struct ChainNode<'a> {
    chain: &'a EngineChain,
    index: usize,
}

impl<'a> ChainNode<'a> {
    pub fn engine(&self) -> &'a Arc<dyn Engine> {
        &self.chain.engines[self.index]
    }

    pub fn previous(&self) -> Option<ChainNode<'a>> {
        self.index.checked_sub(1).map(|index| ChainNode {
            chain: self.chain,
            index,
        })
    }

    pub fn next(&self) -> Option<ChainNode<'a>> {
        let index = self.index + 1;
        (index < self.chain.engines.len()).then_some(ChainNode {
            chain: self.chain,
            index,
        })
    }
}

/// The part of the chain after the running engine.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Engine>],
}

impl<'a> Next<'a> {
    /// Runs the first enabled, non-skipped engine left. With none left, returns the
    /// request's nuts unchanged.
    pub fn process(self, request: &EngineRequest) -> Result<Vec<Arc<Nut>>> {
        let mut remaining = self.remaining;
        while let Some((engine, rest)) = remaining.split_first() {
            if engine.is_enabled() && !request.skips(engine.category()) {
                let slot = request.stats().begin(engine.kind());
                let start = Instant::now();
                let result = engine.process(request, Next { remaining: rest });
                request.stats().finish(slot, start.elapsed());
                return result;
            }
            debug!("Skipping engine {}", engine.kind());
            remaining = rest;
        }
        Ok(request.nuts().to_vec())
    }

    pub fn is_end(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// One chain per nut type, derived from a workflow chain.
#[derive(Clone, Default)]
pub struct ChainSet {
    chains: HashMap<NutType, EngineChain>,
}

impl ChainSet {
    pub fn from_chain(chain: &EngineChain) -> Self {
        let chains = NutType::ALL
            .into_iter()
            .map(|t| (t, chain.for_type(t)))
            .filter(|(_, c)| !c.is_empty())
            .collect();
        Self { chains }
    }

    pub fn chain_for(&self, nut_type: NutType) -> Option<&EngineChain> {
        self.chains.get(&nut_type)
    }

    /// Runs consecutive same-type runs of the request's nuts through their chain, then
    /// merges the outputs with the request's combiner.
    pub fn run(&self, request: &EngineRequest) -> Result<Vec<Arc<Nut>>> {
        let mut groups: Vec<Vec<Arc<Nut>>> = Vec::new();
        for nut in request.nuts() {
            match groups.last_mut() {
                Some(group) if group[0].nut_type() == nut.nut_type() => group.push(nut.clone()),
                _ => groups.push(vec![nut.clone()]),
            }
        }

        let mut out = Vec::new();
        for group in groups {
            let nut_type = group[0].nut_type();
            match self.chain_for(nut_type) {
                Some(chain) => out.extend(chain.process(&request.with_nuts(group))?),
                None => {
                    debug!("No engine for {}, {} nut(s) passed through", nut_type, group.len());
                    out.extend(group);
                }
            }
        }
        request.combiner().merge(out)
    }
}
