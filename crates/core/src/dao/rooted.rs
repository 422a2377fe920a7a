use super::{NutDao, NutDaoListener, PollReport};
use crate::error::Result;
use crate::nut::{Nut, NutType};
use crate::util::merge_path;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// A provider scoped under an extra path prefix.
///
/// Requested paths are prefixed before reaching the delegate; listed paths come back
/// relative to the prefix. Nuts keep the delegate's full names.
pub struct RootedNutDao {
    root: String,
    delegate: Arc<dyn NutDao>,
}

impl RootedNutDao {
    pub fn wrap(delegate: Arc<dyn NutDao>, root: impl Into<String>) -> Arc<dyn NutDao> {
        let root = root.into();
        if root.trim_matches('/').is_empty() {
            return delegate;
        }
        Arc::new(Self { root, delegate })
    }

    fn rooted(&self, path: &str) -> String {
        merge_path(&[self.root.as_str(), path])
    }

    /// `path` relative to the root, or None when it lies outside of it.
    fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let root = self.root.trim_matches('/');
        let rest = path.trim_start_matches('/').strip_prefix(root)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest.trim_start_matches('/'))
        } else {
            None
        }
    }
}

impl NutDao for RootedNutDao {
    fn list_matching_paths(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .delegate
            .list_matching_paths(&self.rooted(pattern))?
            .iter()
            .filter_map(|p| match self.strip(p) {
                Some(relative) => Some(relative.to_string()),
                None => {
                    debug!("Dropping '{}': outside of root '{}'", p, self.root);
                    None
                }
            })
            .collect())
    }

    fn path_of(&self, name: &str) -> String {
        self.strip(name).unwrap_or(name).to_string()
    }

    fn resolve(&self, path: &str, nut_type: NutType) -> Result<Arc<Nut>> {
        self.delegate.resolve(&self.rooted(path), nut_type)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.delegate.exists(&self.rooted(path))
    }

    fn observe(&self, pattern: &str, listeners: &[Arc<dyn NutDaoListener>]) -> Result<()> {
        self.delegate.observe(&self.rooted(pattern), listeners)
    }

    fn save(&self, nut: &Nut) -> Result<()> {
        self.delegate.save(nut)
    }

    fn save_supported(&self) -> bool {
        self.delegate.save_supported()
    }

    fn open_raw_stream(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.delegate.open_raw_stream(&self.rooted(path))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{DiskDaoConfig, DiskNutDao, with_root_path};
    use tempfile::tempdir;

    #[test]
    fn test_paths_are_scoped_under_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("theme/css")).unwrap();
        std::fs::write(dir.path().join("theme/css/a.css"), "a").unwrap();
        let disk = DiskNutDao::new(DiskDaoConfig {
            base_dir: dir.path().to_path_buf(),
            wildcard: true,
            ..DiskDaoConfig::default()
        })
        .unwrap();

        let rooted = with_root_path(disk, "theme");
        assert_eq!(rooted.list_matching_paths("css/*").unwrap(), vec!["css/a.css"]);
        assert!(rooted.exists("css/a.css").unwrap());
        let nut = rooted.resolve("css/a.css", NutType::Css).unwrap();
        assert_eq!(nut.name(), "theme/css/a.css");
        assert_eq!(nut.read_string().unwrap(), "a");
    }

    #[test]
    fn test_root_is_stripped_at_segment_boundary() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("theme/css")).unwrap();
        std::fs::create_dir_all(dir.path().join("themes")).unwrap();
        std::fs::write(dir.path().join("theme/css/a.css"), "a").unwrap();
        std::fs::write(dir.path().join("themes/x.css"), "x").unwrap();
        let disk = DiskNutDao::new(DiskDaoConfig {
            base_dir: dir.path().to_path_buf(),
            regex: true,
            ..DiskDaoConfig::default()
        })
        .unwrap();

        let rooted = with_root_path(disk, "theme");
        assert_eq!(rooted.list_matching_paths(".*").unwrap(), vec!["css/a.css"]);
        assert_eq!(rooted.path_of("theme/css/a.css"), "css/a.css");
        assert_eq!(rooted.path_of("/theme/css/a.css"), "css/a.css");
        assert_eq!(rooted.path_of("themes/x.css"), "themes/x.css");
        assert_eq!(rooted.path_of("theme"), "");
    }
}
