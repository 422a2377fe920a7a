use super::{NutDao, NutDaoListener, PollReport};
use crate::error::Result;
use crate::nut::{Nut, NutType};
use crate::util::merge_path;
use dashmap::DashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Intercepts specific paths before falling back to a delegate.
///
/// A path may be pinned to a ready nut (inline content extracted from markup) or routed to
/// another provider. Rule keys are merged with the root path when it is not empty.
pub struct ProxyNutDao {
    root_path: String,
    delegate: Arc<dyn NutDao>,
    nut_rules: DashMap<String, Arc<Nut>>,
    dao_rules: DashMap<String, Arc<dyn NutDao>>,
}

impl ProxyNutDao {
    pub fn new(root_path: impl Into<String>, delegate: Arc<dyn NutDao>) -> Self {
        Self {
            root_path: root_path.into(),
            delegate,
            nut_rules: DashMap::new(),
            dao_rules: DashMap::new(),
        }
    }

    fn key(&self, path: &str) -> String {
        if self.root_path.is_empty() {
            path.to_string()
        } else {
            merge_path(&[self.root_path.as_str(), path])
        }
    }

    pub fn add_nut_rule(&self, path: &str, nut: Arc<Nut>) {
        let key = self.key(path);
        debug!("Proxy rule {} -> nut {}", key, nut.name());
        self.nut_rules.insert(key, nut);
    }

    pub fn add_dao_rule(&self, path: &str, dao: Arc<dyn NutDao>) {
        let key = self.key(path);
        debug!("Proxy rule {} -> provider", key);
        self.dao_rules.insert(key, dao);
    }

    fn nut_rule(&self, path: &str) -> Option<Arc<Nut>> {
        self.nut_rules.get(path).map(|n| n.value().clone())
    }

    fn dao_for(&self, path: &str) -> Arc<dyn NutDao> {
        self.dao_rules
            .get(path)
            .map(|d| d.value().clone())
            .unwrap_or_else(|| self.delegate.clone())
    }
}

impl NutDao for ProxyNutDao {
    fn list_matching_paths(&self, pattern: &str) -> Result<Vec<String>> {
        if self.nut_rules.contains_key(pattern) {
            return Ok(vec![pattern.to_string()]);
        }
        self.dao_for(pattern).list_matching_paths(pattern)
    }

    fn resolve(&self, path: &str, nut_type: NutType) -> Result<Arc<Nut>> {
        match self.nut_rule(path) {
            Some(nut) => Ok(nut),
            None => self.dao_for(path).resolve(path, nut_type),
        }
    }

    fn create(&self, pattern: &str) -> Result<Vec<Arc<Nut>>> {
        match self.nut_rule(pattern) {
            Some(nut) => Ok(vec![nut]),
            None => self.dao_for(pattern).create(pattern),
        }
    }

    fn path_of(&self, name: &str) -> String {
        self.delegate.path_of(name)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        if self.nut_rules.contains_key(path) {
            return Ok(true);
        }
        self.dao_for(path).exists(path)
    }

    fn observe(&self, pattern: &str, listeners: &[Arc<dyn NutDaoListener>]) -> Result<()> {
        if self.nut_rules.contains_key(pattern) {
            // pinned content never changes
            return Ok(());
        }
        self.dao_for(pattern).observe(pattern, listeners)
    }

    fn save(&self, nut: &Nut) -> Result<()> {
        self.dao_for(nut.name()).save(nut)
    }

    fn save_supported(&self) -> bool {
        self.delegate.save_supported()
    }

    fn open_raw_stream(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        match self.nut_rule(path) {
            Some(nut) => nut.open_stream(),
            None => self.dao_for(path).open_raw_stream(path),
        }
    }

    fn set_polling_interval(&self, seconds: i64) -> Result<()> {
        self.delegate.set_polling_interval(seconds)
    }

    fn polling_interval(&self) -> i64 {
        self.delegate.polling_interval()
    }

    fn run_poll_cycle(&self) -> PollReport {
        self.delegate.run_poll_cycle()
    }
}
