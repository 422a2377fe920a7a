use super::{Engine, EngineRequest, EngineType, Next};
use crate::error::{NutpipeError, Result};
use crate::nut::{Nut, NutBuilder, NutType, Transformer};
use std::sync::Arc;

/// Plugs an external [`Transformer`] (a minifier, a converter) into the chain.
///
/// Only text-reducible nuts are transformed; the others pass through.
pub struct TransformerEngine {
    kind: &'static str,
    category: EngineType,
    types: Vec<NutType>,
    transformer: Arc<dyn Transformer>,
    enabled: bool,
}

impl TransformerEngine {
    pub fn new(
        kind: &'static str,
        category: EngineType,
        types: Vec<NutType>,
        transformer: Arc<dyn Transformer>,
    ) -> Result<Self> {
        if !matches!(category, EngineType::Minification | EngineType::Converter) {
            return Err(NutpipeError::BadState(format!(
                "transformer engine '{kind}' cannot run as {category:?}"
            )));
        }
        Ok(Self {
            kind,
            category,
            types,
            transformer,
            enabled: true,
        })
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl Engine for TransformerEngine {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn category(&self) -> EngineType {
        self.category
    }

    fn applicable_types(&self) -> &[NutType] {
        &self.types
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn process(&self, request: &EngineRequest, next: Next<'_>) -> Result<Vec<Arc<Nut>>> {
        let transformed = request
            .nuts()
            .iter()
            .map(|nut| {
                if nut.is_text_reducible() && !nut.is_compressed() {
                    NutBuilder::derived(nut)
                        .transformed(nut.clone(), self.transformer.clone())
                        .build()
                } else {
                    Ok(nut.clone())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        next.process(&request.with_nuts(transformed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{DiskNutDao, NutDao};
    use crate::engine::EngineChain;
    use crate::heap::NutsHeap;
    use std::io::{Read, Write};
    use tempfile::tempdir;

    struct StripSpaces;

    impl Transformer for StripSpaces {
        fn name(&self) -> &str {
            "strip-spaces"
        }

        fn transform(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<()> {
            let mut s = String::new();
            input.read_to_string(&mut s)?;
            output.write_all(s.replace(' ', "").as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn test_minifies_text_nuts() {
        let engine = TransformerEngine::new(
            "strip-spaces",
            EngineType::Minification,
            vec![NutType::Css],
            Arc::new(StripSpaces),
        )
        .unwrap();
        let dir = tempdir().unwrap();
        let dao: Arc<dyn NutDao> = DiskNutDao::at(dir.path()).unwrap();
        let request = EngineRequest::builder("wf", Arc::new(NutsHeap::of("h", dao, vec![])))
            .nuts(vec![Nut::from_bytes("a.css", NutType::Css, b"a { }".to_vec())])
            .build();

        let chain = EngineChain::new([Arc::new(engine) as Arc<dyn Engine>]);
        let out = chain.process(&request).unwrap();
        assert_eq!(out[0].read_string().unwrap(), "a{}");
        assert_eq!(out[0].name(), "a.css");
    }

    #[test]
    fn test_wrong_category_rejected() {
        let err = TransformerEngine::new(
            "strip-spaces",
            EngineType::Cache,
            vec![NutType::Css],
            Arc::new(StripSpaces),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadState);
    }
}
