use super::base::{DaoBackend, DaoCore, DaoSettings};
use super::tree::{PathMatching, PathTree};
use crate::error::{NutpipeError, Result};
use crate::nut::StreamSource;
use crate::path::FsDirectory;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskDaoConfig {
    /// Directory the base path is resolved against.
    pub base_dir: PathBuf,
    pub regex: bool,
    pub wildcard: bool,
    /// Relative path prefixes excluded from listings.
    pub skip: Vec<String>,
    #[serde(flatten)]
    pub settings: DaoSettings,
}

impl Default for DiskDaoConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            regex: false,
            wildcard: false,
            skip: Vec::new(),
            settings: DaoSettings::default(),
        }
    }
}

/// Files under a base directory. Supports writing nuts back.
pub struct DiskBackend {
    directory: PathBuf,
    tree: PathTree,
}

pub type DiskNutDao = DaoCore<DiskBackend>;

impl DiskNutDao {
    pub fn new(config: DiskDaoConfig) -> Result<Arc<Self>> {
        let matching = PathMatching::from_flags(config.regex, config.wildcard)?;
        let directory = config
            .base_dir
            .join(config.settings.base_path.trim_start_matches('/'));
        let root = FsDirectory::new(&directory)?;
        let tree = PathTree::new(Arc::new(root), matching, config.skip);
        Ok(DaoCore::with_backend(DiskBackend { directory, tree }, config.settings))
    }

    /// Exact-matching provider over `directory`, handy for tests and tools.
    pub fn at(directory: impl Into<PathBuf>) -> Result<Arc<Self>> {
        Self::new(DiskDaoConfig {
            base_dir: directory.into(),
            ..DiskDaoConfig::default()
        })
    }
}

impl StreamSource for DiskBackend {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.tree.open(path)
    }
}

impl DaoBackend for DiskBackend {
    fn describe(&self) -> String {
        format!("disk:{}", self.directory.display())
    }

    fn list_paths(&self, pattern: &str) -> Result<Vec<String>> {
        self.tree.list(pattern)
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

    fn save_supported(&self) -> bool {
        true
    }

    fn save(&self, path: &str, content: &mut dyn Read) -> Result<()> {
        let relative = crate::util::simplify_path(path.trim_start_matches('/'))?;
        if relative.is_empty() {
            return Err(NutpipeError::bad_argument("cannot save a nut without a name"));
        }
        let target = self.directory.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&target)?;
        let written = std::io::copy(content, &mut file)?;
        debug!("Saved {} ({} bytes)", target.display(), written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::NutDao;
    use crate::error::ErrorKind;
    use crate::nut::{Nut, NutType, VersionStrategy};
    use tempfile::tempdir;

    #[test]
    fn test_base_must_be_directory() {
        let dir = tempdir().unwrap();
        let err = DiskNutDao::at(dir.path().join("missing")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
    }

    #[test]
    fn test_resolve_directory_is_bad_argument() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        let dao = DiskNutDao::at(dir.path()).unwrap();
        let err = dao.resolve("css", NutType::Css).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadArgument);
    }

    #[test]
    fn test_create_skips_unknown_types() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.css"), "a{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let dao = DiskNutDao::new(DiskDaoConfig {
            base_dir: dir.path().to_path_buf(),
            wildcard: true,
            ..DiskDaoConfig::default()
        })
        .unwrap();
        let nuts = dao.create("*").unwrap();
        assert_eq!(nuts.len(), 1);
        assert_eq!(nuts[0].name(), "a.css");
    }

    #[test]
    fn test_save_writes_under_base() {
        let dir = tempdir().unwrap();
        let dao = DiskNutDao::at(dir.path()).unwrap();
        assert!(dao.save_supported());
        let nut = Nut::from_bytes("out/app.js", NutType::Javascript, b"var a;".to_vec());
        dao.save(&nut).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/app.js")).unwrap(),
            "var a;"
        );
        assert!(dao.exists("out/app.js").unwrap());
    }

    #[test]
    fn test_proxy_uris_are_round_robin() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.css"), "a{}").unwrap();
        let mut config = DiskDaoConfig {
            base_dir: dir.path().to_path_buf(),
            ..DiskDaoConfig::default()
        };
        config.settings.proxy_uris = vec!["http://cdn1".to_string(), "http://cdn2".to_string()];
        config.settings.version = VersionStrategy::content_based();
        let dao = DiskNutDao::new(config).unwrap();

        let first = dao.resolve("a.css", NutType::Css).unwrap();
        let second = dao.resolve("a.css", NutType::Css).unwrap();
        assert_eq!(first.proxy_uri(), Some("http://cdn1/a.css"));
        assert_eq!(second.proxy_uri(), Some("http://cdn2/a.css"));
        assert_eq!(first.version_number().unwrap(), second.version_number().unwrap());
    }
}
