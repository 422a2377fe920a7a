use super::base::{DaoBackend, DaoCore, DaoSettings};
use super::tree::{PathMatching, PathTree};
use crate::error::{NutpipeError, Result};
use crate::nut::StreamSource;
use crate::path::{DirectoryPath, Path, VirtualDirectory, build_path};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClasspathDaoConfig {
    /// Directories and archives searched in order.
    pub roots: Vec<PathBuf>,
    pub regex: bool,
    pub wildcard: bool,
    pub skip: Vec<String>,
    #[serde(flatten)]
    pub settings: DaoSettings,
}

/// Resources bundled in directories or packaged archives, unioned behind one root.
pub struct ClasspathBackend {
    label: String,
    tree: PathTree,
}

pub type ClasspathNutDao = DaoCore<ClasspathBackend>;

impl ClasspathNutDao {
    pub fn new(config: ClasspathDaoConfig) -> Result<Arc<Self>> {
        let matching = PathMatching::from_flags(config.regex, config.wildcard)?;
        let base = config.settings.base_path.trim_start_matches('/').to_string();

        let mut members: Vec<Arc<dyn DirectoryPath>> = Vec::new();
        for root in &config.roots {
            let resolved = match build_path(root) {
                Ok(Path::Directory(dir)) if base.is_empty() => Ok(Path::Directory(dir)),
                Ok(Path::Directory(dir)) => dir.child(&base),
                Ok(Path::File(_)) => Err(NutpipeError::bad_argument(format!(
                    "{} is neither a directory nor an archive",
                    root.display()
                ))),
                Err(e) => Err(e),
            };
            match resolved {
                Ok(Path::Directory(dir)) => members.push(dir),
                Ok(Path::File(_)) => debug!("{}!/{} is a file", root.display(), base),
                Err(e) => debug!("{} does not provide '{}': {}", root.display(), base, e),
            }
        }

        if members.is_empty() {
            return Err(NutpipeError::bad_argument(format!(
                "no classpath root provides '{base}'"
            )));
        }

        let label = format!("classpath:{base}");
        info!("{} resolved from {} root(s)", label, members.len());
        let root = VirtualDirectory::new(base.clone(), members);
        let tree = PathTree::new(Arc::new(root), matching, config.skip);
        Ok(DaoCore::with_backend(ClasspathBackend { label, tree }, config.settings))
    }
}

impl StreamSource for ClasspathBackend {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.tree.open(path)
    }
}

impl DaoBackend for ClasspathBackend {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn list_paths(&self, pattern: &str) -> Result<Vec<String>> {
        let mut paths = self.tree.list(pattern)?;
        // the same resource may be shipped by several roots
        let mut seen = std::collections::HashSet::new();
        paths.retain(|p| seen.insert(p.clone()));
        Ok(paths)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.tree.exists(path)
    }

    fn last_update(&self, path: &str) -> Result<u64> {
        self.tree.last_update(path)
    }

    fn check_leaf(&self, path: &str) -> Result<()> {
        self.tree.file(path).map(|_| ())
    }
}
