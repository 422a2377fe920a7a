use super::{Engine, EngineRequest, EngineType, Next};
use crate::error::Result;
use crate::nut::{Nut, NutBuilder, NutType, Transformer};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GzipConfig {
    pub compress: bool,
    /// 0 (store) to 9 (best).
    pub level: u32,
}

impl Default for GzipConfig {
    fn default() -> Self {
        Self {
            compress: true,
            level: 6,
        }
    }
}

pub struct GzipTransformer {
    level: Compression,
}

impl GzipTransformer {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Transformer for GzipTransformer {
    fn name(&self) -> &str {
        "gzip"
    }

    fn transform(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<()> {
        let mut encoder = GzEncoder::new(output, self.level);
        std::io::copy(input, &mut encoder)?;
        encoder.finish()?;
        Ok(())
    }
}

/// Gzips every nut not compressed yet, referenced nuts included.
pub struct GzipEngine {
    enabled: bool,
    transformer: Arc<dyn Transformer>,
}

impl GzipEngine {
    pub fn new(config: GzipConfig) -> Self {
        Self {
            enabled: config.compress,
            transformer: Arc::new(GzipTransformer::new(config.level)),
        }
    }

    pub fn compress(&self, nut: &Arc<Nut>) -> Result<Arc<Nut>> {
        if nut.is_compressed() {
            return Ok(nut.clone());
        }
        let referenced = nut
            .referenced_nuts()
            .iter()
            .map(|r| self.compress(r))
            .collect::<Result<Vec<_>>>()?;
        NutBuilder::derived(nut)
            .transformed(nut.clone(), self.transformer.clone())
            .compressed(true)
            .referenced(referenced)
            .build()
    }
}

impl Default for GzipEngine {
    fn default() -> Self {
        Self::new(GzipConfig::default())
    }
}

impl Engine for GzipEngine {
    fn kind(&self) -> &'static str {
        "gzip"
    }

    fn category(&self) -> EngineType {
        EngineType::BinaryCompression
    }

    fn applicable_types(&self) -> &[NutType] {
        &NutType::ALL
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn process(&self, request: &EngineRequest, next: Next<'_>) -> Result<Vec<Arc<Nut>>> {
        let compressed = request
            .nuts()
            .iter()
            .map(|n| self.compress(n))
            .collect::<Result<Vec<_>>>()?;
        next.process(&request.with_nuts(compressed))
    }
}
