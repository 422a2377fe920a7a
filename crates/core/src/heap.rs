use crate::dao::{NutDao, NutDaoListener};
use crate::error::{NutpipeError, Result};
use crate::nut::Nut;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A named group of paths bound to one provider, possibly composed of other heaps.
pub struct NutsHeap {
    id: String,
    dao: Option<Arc<dyn NutDao>>,
    paths: Vec<String>,
    composition: Vec<Arc<NutsHeap>>,
}

impl NutsHeap {
    pub fn new(
        id: impl Into<String>,
        dao: Option<Arc<dyn NutDao>>,
        paths: Vec<String>,
        composition: Vec<Arc<NutsHeap>>,
    ) -> Result<Self> {
        let id = id.into();
        if dao.is_none() && !paths.is_empty() {
            return Err(NutpipeError::BadState(format!(
                "heap '{id}' declares paths without a provider"
            )));
        }
        if dao.is_none() && composition.is_empty() {
            return Err(NutpipeError::BadState(format!(
                "heap '{id}' has neither a provider nor sub-heaps"
            )));
        }
        Ok(Self {
            id,
            dao,
            paths,
            composition,
        })
    }

    /// Heap over `paths` of a single provider.
    pub fn of(id: impl Into<String>, dao: Arc<dyn NutDao>, paths: Vec<String>) -> Self {
        Self {
            id: id.into(),
            dao: Some(dao),
            paths,
            composition: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dao(&self) -> Option<&Arc<dyn NutDao>> {
        self.dao.as_ref()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn composition(&self) -> &[Arc<NutsHeap>] {
        &self.composition
    }

    /// Own paths in declaration order, then every sub-heap in order.
    pub fn resolve(&self) -> Result<Vec<Arc<Nut>>> {
        let start = Instant::now();
        let mut nuts = Vec::new();
        if let Some(dao) = &self.dao {
            for path in &self.paths {
                let created = dao.create(path)?;
                if created.is_empty() {
                    debug!("Heap '{}': '{}' matched nothing", self.id, path);
                }
                nuts.extend(created);
            }
        }
        for heap in &self.composition {
            nuts.extend(heap.resolve()?);
        }
        debug!(
            "Heap '{}' resolved {} nut(s) in {:?}",
            self.id,
            nuts.len(),
            start.elapsed()
        );
        Ok(nuts)
    }

    /// Registers `listener` for every path of this heap and its sub-heaps.
    pub fn observe(&self, listener: &Arc<dyn NutDaoListener>) -> Result<()> {
        if let Some(dao) = &self.dao {
            for path in &self.paths {
                dao.observe(path, std::slice::from_ref(listener))?;
            }
        }
        for heap in &self.composition {
            heap.observe(listener)?;
        }
        Ok(())
    }

    /// Provider able to serve `path`, searching this heap first, then sub-heaps.
    pub fn find_dao_for(&self, path: &str) -> Option<Arc<dyn NutDao>> {
        if let Some(dao) = &self.dao {
            if dao.exists(&dao.path_of(path)).unwrap_or(false) {
                return Some(dao.clone());
            }
        }
        self.composition
            .iter()
            .find_map(|heap| heap.find_dao_for(path))
            .or_else(|| self.first_dao())
    }

    fn first_dao(&self) -> Option<Arc<dyn NutDao>> {
        self.dao
            .clone()
            .or_else(|| self.composition.iter().find_map(|heap| heap.first_dao()))
    }
}

impl std::fmt::Debug for NutsHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NutsHeap")
            .field("id", &self.id)
            .field("paths", &self.paths)
            .field("composition", &self.composition)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::DiskNutDao;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_order_is_declaration_then_composition() {
        let dir = tempdir().unwrap();
        for name in ["a.css", "b.css", "c.js"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let dao: Arc<dyn NutDao> = DiskNutDao::at(dir.path()).unwrap();
        let nested = Arc::new(NutsHeap::of("js", dao.clone(), vec!["c.js".to_string()]));
        let heap = NutsHeap::new(
            "all",
            Some(dao),
            vec!["b.css".to_string(), "a.css".to_string()],
            vec![nested],
        )
        .unwrap();

        let names: Vec<String> = heap
            .resolve()
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(names, vec!["b.css", "a.css", "c.js"]);
    }

    #[test]
    fn test_paths_without_provider_rejected() {
        let err = NutsHeap::new("broken", None, vec!["a.css".to_string()], vec![]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadState);
    }
}
