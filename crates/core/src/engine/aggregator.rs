use super::{Engine, EngineRequest, EngineType, Next};
use crate::error::Result;
use crate::nut::{Nut, NutType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const SEPARATOR: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub aggregate: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { aggregate: true }
    }
}

/// Concatenates every script or stylesheet of a request into `aggregate.js` / `aggregate.css`.
pub struct TextAggregatorEngine {
    enabled: bool,
}

impl TextAggregatorEngine {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            enabled: config.aggregate,
        }
    }
}

impl Default for TextAggregatorEngine {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl Engine for TextAggregatorEngine {
    fn kind(&self) -> &'static str {
        "text-aggregator"
    }

    fn category(&self) -> EngineType {
        EngineType::Aggregator
    }

    fn applicable_types(&self) -> &[NutType] {
        &[NutType::Css, NutType::Javascript]
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn process(&self, request: &EngineRequest, next: Next<'_>) -> Result<Vec<Arc<Nut>>> {
        let nuts = request.nuts();
        let Some(first) = nuts.first() else {
            return next.process(request);
        };
        if !nuts.iter().all(|n| n.is_aggregatable() && n.nut_type() == first.nut_type()) {
            debug!("Aggregation skipped: mixed or non-aggregatable input");
            return next.process(request);
        }

        let name = format!("aggregate{}", first.nut_type().extension());
        let aggregate = Nut::composite(Some(name), Some(SEPARATOR), nuts.to_vec())?;
        debug!("Aggregated {} nut(s) into {}", nuts.len(), aggregate.name());
        next.process(&request.with_nuts(vec![aggregate]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{DiskNutDao, NutDao};
    use crate::engine::{ChainSet, EngineChain};
    use crate::heap::NutsHeap;
    use tempfile::tempdir;

    #[test]
    fn test_aggregates_with_crlf() {
        let dir = tempdir().unwrap();
        let dao: Arc<dyn NutDao> = DiskNutDao::at(dir.path()).unwrap();
        let heap = Arc::new(NutsHeap::of("h", dao, vec![]));
        let chain = EngineChain::new([Arc::new(TextAggregatorEngine::default()) as Arc<dyn Engine>]);
        let request = EngineRequest::builder("wf", heap)
            .nuts(vec![
                Nut::from_bytes("a.js", NutType::Javascript, b"var a;".to_vec()),
                Nut::from_bytes("b.js", NutType::Javascript, b"var b;".to_vec()),
            ])
            .chains(Arc::new(ChainSet::from_chain(&chain)))
            .build();

        let out = chain.process(&request).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name(), "aggregate.js");
        assert_eq!(out[0].read_string().unwrap(), "var a;\r\nvar b;");
        assert_eq!(out[0].original_nuts().len(), 2);
    }

    #[test]
    fn test_disabled_passes_through() {
        let dir = tempdir().unwrap();
        let dao: Arc<dyn NutDao> = DiskNutDao::at(dir.path()).unwrap();
        let heap = Arc::new(NutsHeap::of("h", dao, vec![]));
        let chain = EngineChain::new([Arc::new(TextAggregatorEngine::new(AggregatorConfig {
            aggregate: false,
        })) as Arc<dyn Engine>]);
        let request = EngineRequest::builder("wf", heap)
            .nuts(vec![
                Nut::from_bytes("a.css", NutType::Css, b"a".to_vec()),
                Nut::from_bytes("b.css", NutType::Css, b"b".to_vec()),
            ])
            .build();
        assert_eq!(chain.process(&request).unwrap().len(), 2);
    }
}
