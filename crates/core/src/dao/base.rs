use super::polling::{ListenerRegistry, PollReport, PollTarget, PollingScheduler};
use super::{NutDao, NutDaoListener};
use crate::error::{NutpipeError, Result};
use crate::nut::version::content_hash;
use crate::nut::{Nut, NutType, StreamSource, VersionNumber, VersionStrategy};
use crate::util::merge_path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, warn};

/// Options shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaoSettings {
    /// Prefix merged in front of every requested path.
    pub base_path: String,
    /// Public URL prefixes; nuts get one of them, round-robin.
    pub proxy_uris: Vec<String>,
    /// Seconds between poll cycles. Non-positive disables polling.
    pub polling_interval_seconds: i64,
    #[serde(flatten)]
    pub version: VersionStrategy,
}

impl Default for DaoSettings {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            proxy_uris: Vec::new(),
            polling_interval_seconds: -1,
            version: VersionStrategy::default(),
        }
    }
}

/// Storage-specific half of a provider.
pub trait DaoBackend: StreamSource + 'static {
    fn describe(&self) -> String;

    fn list_paths(&self, pattern: &str) -> Result<Vec<String>>;

    fn exists(&self, path: &str) -> Result<bool>;

    /// Last modification of `path` in milliseconds since the epoch.
    fn last_update(&self, path: &str) -> Result<u64>;

    /// Fails unless `path` names a readable leaf.
    fn check_leaf(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn save_supported(&self) -> bool {
        false
    }

    fn save(&self, path: &str, _content: &mut dyn Read) -> Result<()> {
        Err(NutpipeError::UnsupportedOperation(format!(
            "{} cannot save {path}",
            self.describe()
        )))
    }
}

/// Provider logic common to every backend: versions, proxy URIs and polling.
pub struct DaoCore<B: DaoBackend> {
    backend: Arc<B>,
    settings: DaoSettings,
    proxy_index: AtomicUsize,
    listeners: ListenerRegistry,
    scheduler: PollingScheduler,
    self_ref: Weak<DaoCore<B>>,
}

impl<B: DaoBackend> DaoCore<B> {
    /// Starts polling right away when the settings ask for it and a tokio runtime is
    /// available.
    pub fn with_backend(backend: B, settings: DaoSettings) -> Arc<Self> {
        let interval = settings.polling_interval_seconds;
        let dao = Arc::new_cyclic(|self_ref| Self {
            backend: Arc::new(backend),
            settings,
            proxy_index: AtomicUsize::new(0),
            listeners: ListenerRegistry::new(),
            scheduler: PollingScheduler::new(),
            self_ref: self_ref.clone(),
        });
        if interval > 0 {
            if let Err(e) = dao.set_polling_interval(interval) {
                warn!("{}: polling not started: {}", dao.backend.describe(), e);
            }
        }
        dao
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &DaoSettings {
        &self.settings
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    fn next_proxy_uri(&self, name: &str) -> Option<String> {
        if self.settings.proxy_uris.is_empty() {
            return None;
        }
        let idx = self.proxy_index.fetch_add(1, Ordering::Relaxed) % self.settings.proxy_uris.len();
        Some(merge_path(&[self.settings.proxy_uris[idx].as_str(), name]))
    }

    fn version_for(&self, path: &str) -> VersionNumber {
        let strategy = &self.settings.version;
        if let Some(fixed) = strategy.fixed_version {
            return VersionNumber::ready(fixed);
        }
        let backend = self.backend.clone();
        let content_based = strategy.content_based;
        let path = path.to_string();
        VersionNumber::compute(strategy.compute_async, move || {
            marker_of(backend.as_ref(), content_based, &path)
        })
    }
}

fn marker_of<B: DaoBackend>(backend: &B, content_based: bool, path: &str) -> Result<u64> {
    if content_based {
        let mut reader = backend.open(path)?;
        content_hash(&mut reader)
    } else {
        backend.last_update(path)
    }
}

impl<B: DaoBackend> PollTarget for DaoCore<B> {
    fn poll_paths(&self, pattern: &str) -> Result<Vec<String>> {
        self.backend.list_paths(pattern)
    }

    fn poll_marker(&self, path: &str) -> Result<u64> {
        marker_of(self.backend.as_ref(), self.settings.version.content_based, path)
    }
}

impl<B: DaoBackend> NutDao for DaoCore<B> {
    fn list_matching_paths(&self, pattern: &str) -> Result<Vec<String>> {
        self.backend.list_paths(pattern)
    }

    fn resolve(&self, path: &str, nut_type: NutType) -> Result<Arc<Nut>> {
        self.backend.check_leaf(path)?;
        let source: Arc<dyn StreamSource> = self.backend.clone();
        Nut::builder(path, nut_type)
            .source(source, path)
            .version(self.version_for(path))
            .proxy_uri(self.next_proxy_uri(path))
            .build()
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.backend.exists(path)
    }

    fn observe(&self, pattern: &str, listeners: &[Arc<dyn NutDaoListener>]) -> Result<()> {
        let mut baseline = HashMap::new();
        match self.backend.list_paths(pattern) {
            Ok(paths) => {
                for path in paths {
                    match self.poll_marker(&path) {
                        Ok(marker) => {
                            baseline.insert(path, marker);
                        }
                        Err(e) => debug!("No baseline for '{}': {}", path, e),
                    }
                }
            }
            Err(e) => debug!("No baseline for pattern '{}': {}", pattern, e),
        }
        for listener in listeners {
            self.listeners.register(pattern, listener, baseline.clone());
        }
        Ok(())
    }

    fn save(&self, nut: &Nut) -> Result<()> {
        if !self.backend.save_supported() {
            return Err(NutpipeError::UnsupportedOperation(format!(
                "{} is read-only, cannot save {}",
                self.backend.describe(),
                nut.name()
            )));
        }
        let mut reader = nut.open_stream()?;
        self.backend.save(nut.name(), &mut reader)
    }

    fn save_supported(&self) -> bool {
        self.backend.save_supported()
    }

    fn open_raw_stream(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.backend.open(path)
    }

    fn set_polling_interval(&self, seconds: i64) -> Result<()> {
        let weak: Weak<dyn NutDao> = self.self_ref.clone();
        self.scheduler
            .set_interval(seconds, weak, &self.backend.describe())
    }

    fn polling_interval(&self) -> i64 {
        self.scheduler.interval()
    }

    fn run_poll_cycle(&self) -> PollReport {
        let start = Instant::now();
        let report = self.listeners.run_cycle(self);
        debug!(
            "{}: poll cycle over {} listener(s) took {:?}",
            self.backend.describe(),
            report.listeners,
            start.elapsed()
        );
        report
    }
}

impl<B: DaoBackend> Drop for DaoCore<B> {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}
