//! Resource providers ("DAOs").
//!
//! A provider lists the concrete paths matching a pattern, turns them into [`Nut`]s, tells
//! whether a path exists and watches paths for changes on behalf of registered listeners.
//!
//! ```text
//!                       ┌───────────────────────────┐
//!   NutDao (trait) <─── │ DaoCore<B: DaoBackend>    │  versions, proxy uris, polling
//!        ^              └─────────────┬─────────────┘
//!        │                            │ backend
//!        │              ┌─────────────┼──────────────┐
//!        │          DiskBackend  ClasspathBackend  HttpBackend
//!        │
//!        ├── ProxyNutDao   (rules: path -> nut | path -> dao, else delegate)
//!        └── RootedNutDao  (prefixes every path)
//! ```

pub mod base;
pub mod classpath;
pub mod disk;
pub mod http;
pub mod polling;
pub mod proxy;
pub mod rooted;
pub mod tree;

pub use base::{DaoBackend, DaoCore, DaoSettings};
pub use classpath::{ClasspathDaoConfig, ClasspathNutDao};
pub use disk::{DiskDaoConfig, DiskNutDao};
pub use http::{HttpDaoConfig, HttpNutDao};
pub use polling::{ListenerRegistry, PollReport, PollTarget, PollingScheduler};
pub use proxy::ProxyNutDao;
pub use rooted::RootedNutDao;
pub use tree::{PathMatching, PathTree};

use crate::error::{NutpipeError, Result};
use crate::nut::{Nut, NutType};
use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Receives change notifications from a provider's poll loop.
pub trait NutDaoListener: Send + Sync {
    /// Gate called once per observed pattern and cycle. Returning false excludes the
    /// listener from the rest of the cycle.
    fn polling(&self, pattern: &str, paths: &HashSet<String>) -> bool;

    /// `path` changed and now carries `marker`. Returning false stops the remaining
    /// notifications of this cycle for this listener.
    fn nut_polled(&self, path: &str, marker: u64) -> bool;

    /// A listener that will never accept notifications again is dropped from its provider
    /// at the start of the next cycle.
    fn is_alive(&self) -> bool {
        true
    }
}

pub trait NutDao: Send + Sync {
    /// Concrete paths matching `pattern`, according to the provider's matching mode.
    fn list_matching_paths(&self, pattern: &str) -> Result<Vec<String>>;

    /// Nut bound to a concrete path. Fails with `BadArgument` when the path is not a leaf.
    fn resolve(&self, path: &str, nut_type: NutType) -> Result<Arc<Nut>>;

    /// Path under which this provider serves a nut name it produced.
    fn path_of(&self, name: &str) -> String {
        name.to_string()
    }

    /// Nuts for every matching path. Paths of unknown type are skipped.
    fn create(&self, pattern: &str) -> Result<Vec<Arc<Nut>>> {
        let mut nuts = Vec::new();
        for path in self.list_matching_paths(pattern)? {
            match NutType::from_path(&path) {
                Some(nut_type) => nuts.push(self.resolve(&path, nut_type)?),
                None => debug!("Skipping '{}': no nut type for its extension", path),
            }
        }
        Ok(nuts)
    }

    fn exists(&self, path: &str) -> Result<bool>;

    fn observe(&self, pattern: &str, listeners: &[Arc<dyn NutDaoListener>]) -> Result<()>;

    fn save(&self, nut: &Nut) -> Result<()> {
        Err(NutpipeError::UnsupportedOperation(format!(
            "cannot save {}: provider is read-only",
            nut.name()
        )))
    }

    fn save_supported(&self) -> bool {
        false
    }

    fn open_raw_stream(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Seconds between poll cycles; non-positive disables polling.
    fn set_polling_interval(&self, seconds: i64) -> Result<()>;

    fn polling_interval(&self) -> i64;

    /// Runs one detection pass synchronously.
    fn run_poll_cycle(&self) -> PollReport;

    fn shutdown(&self) {
        let _ = self.set_polling_interval(-1);
    }
}

/// `dao` scoped under `root`: every path it receives or returns is relative to `root`.
pub fn with_root_path(dao: Arc<dyn NutDao>, root: &str) -> Arc<dyn NutDao> {
    RootedNutDao::wrap(dao, root)
}
