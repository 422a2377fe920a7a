//! Transformation engines and the chain executing them.
//!
//! ```text
//!   EngineRequest ──> Next ──> [CACHE] ──> [INSPECTOR] ──> [CONVERTER] ──> [MINIFICATION]
//!                                                      ──> [AGGREGATOR] ──> [BINARY_COMPRESSION] ──> nuts
//! ```
//!
//! Every engine receives the request and the [`Next`] handle of the rest of the chain. It
//! decides what to forward and may post-process what comes back (the cache does).

pub mod aggregator;
pub mod cache;
pub mod chain;
pub mod gzip;
pub mod inspector;
pub mod request;
pub mod transformer;

pub use aggregator::{AggregatorConfig, TextAggregatorEngine};
pub use cache::{CacheConfig, CacheInvalidator, CacheStore, MemoryCacheEngine, MemoryCacheStore};
pub use chain::{ChainNode, ChainSet, EngineChain, Next};
pub use gzip::{GzipConfig, GzipEngine, GzipTransformer};
pub use inspector::{HtmlInspectorEngine, InspectorConfig};
pub use request::{EngineRequest, EngineRequestBuilder, ExecutionStats};
pub use transformer::TransformerEngine;

use crate::error::Result;
use crate::nut::{Nut, NutType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Engine categories, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineType {
    Cache,
    Inspector,
    Converter,
    Minification,
    Aggregator,
    BinaryCompression,
}

pub trait Engine: Send + Sync {
    /// Implementation identity. Two engines of the same kind replace each other in a chain.
    fn kind(&self) -> &'static str;

    fn category(&self) -> EngineType;

    fn applicable_types(&self) -> &[NutType];

    /// A disabled engine is skipped by the chain.
    fn is_enabled(&self) -> bool {
        true
    }

    fn process(&self, request: &EngineRequest, next: Next<'_>) -> Result<Vec<Arc<Nut>>>;
}

impl std::fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:?})", self.kind(), self.category())
    }
}
