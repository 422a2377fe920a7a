use crate::error::{NutpipeError, Result};
use crate::path::{DirectoryPath, FilePath, Path};
use crate::util::{merge_path, parent_of};
use regex::Regex;
use std::io::Read;
use std::sync::Arc;

/// How a provider interprets the patterns it is asked to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMatching {
    /// The pattern is a concrete path.
    #[default]
    Exact,
    /// The pattern is a regular expression matched against whole relative paths.
    Regex,
    /// The pattern holds a single `*` standing for any sequence of characters.
    Wildcard,
}

impl PathMatching {
    pub fn from_flags(regex: bool, wildcard: bool) -> Result<Self> {
        match (regex, wildcard) {
            (true, true) => Err(NutpipeError::bad_argument(
                "regex and wildcard matching cannot both be enabled",
            )),
            (true, false) => Ok(PathMatching::Regex),
            (false, true) => Ok(PathMatching::Wildcard),
            (false, false) => Ok(PathMatching::Exact),
        }
    }
}

/// Listing and lookup over a virtual directory root.
pub struct PathTree {
    root: Arc<dyn DirectoryPath>,
    matching: PathMatching,
    skipped: Vec<String>,
}

impl PathTree {
    pub fn new(root: Arc<dyn DirectoryPath>, matching: PathMatching, skipped: Vec<String>) -> Self {
        Self {
            root,
            matching,
            skipped,
        }
    }

    pub fn root(&self) -> &Arc<dyn DirectoryPath> {
        &self.root
    }

    pub fn matching(&self) -> PathMatching {
        self.matching
    }

    fn is_skipped(&self, relative: &str) -> bool {
        self.skipped.iter().any(|prefix| relative.starts_with(prefix.as_str()))
    }

    pub fn lookup(&self, path: &str) -> Result<Path> {
        self.root.child(path)
    }

    pub fn file(&self, path: &str) -> Result<Arc<dyn FilePath>> {
        self.lookup(path)?.into_file()
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        match self.lookup(path) {
            Ok(_) => Ok(true),
            Err(NutpipeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.file(path)?.open()
    }

    pub fn last_update(&self, path: &str) -> Result<u64> {
        self.lookup(path)?.last_update()
    }

    pub fn list(&self, pattern: &str) -> Result<Vec<String>> {
        match self.matching {
            PathMatching::Exact => {
                if self.is_skipped(pattern) || !self.exists(pattern)? {
                    Ok(Vec::new())
                } else {
                    Ok(vec![pattern.to_string()])
                }
            }
            PathMatching::Regex => {
                let regex = Regex::new(&format!("^(?:{pattern})$"))?;
                let mut out = Vec::new();
                self.walk(self.root.as_ref(), "", &mut |relative| regex.is_match(relative), &mut out)?;
                Ok(out)
            }
            PathMatching::Wildcard => {
                let (prefix, suffix) = match pattern.split_once('*') {
                    Some(split) => split,
                    None => (pattern, ""),
                };
                let dir = parent_of(prefix);
                let start = if dir.is_empty() {
                    self.root.clone()
                } else {
                    match self.lookup(dir) {
                        Ok(Path::Directory(d)) => d,
                        Ok(Path::File(_)) | Err(NutpipeError::NotFound(_)) => return Ok(Vec::new()),
                        Err(e) => return Err(e),
                    }
                };
                let mut out = Vec::new();
                self.walk(
                    start.as_ref(),
                    dir,
                    &mut |relative| {
                        relative.len() >= prefix.len() + suffix.len()
                            && relative.starts_with(prefix)
                            && relative.ends_with(suffix)
                    },
                    &mut out,
                )?;
                Ok(out)
            }
        }
    }

    fn walk(
        &self,
        dir: &dyn DirectoryPath,
        relative: &str,
        accept: &mut dyn FnMut(&str) -> bool,
        out: &mut Vec<String>,
    ) -> Result<()> {
        for name in dir.list()? {
            let child_relative = merge_path(&[relative, name.as_str()]);
            if self.is_skipped(&child_relative) {
                continue;
            }
            match dir.child_entry(&name)? {
                Path::Directory(child) => self.walk(child.as_ref(), &child_relative, accept, out)?,
                Path::File(_) => {
                    if accept(&child_relative) {
                        out.push(child_relative);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FsDirectory;
    use tempfile::tempdir;

    fn tree(matching: PathMatching, skipped: Vec<String>) -> (tempfile::TempDir, PathTree) {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css/vendor")).unwrap();
        std::fs::create_dir_all(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("css/a.css"), "a").unwrap();
        std::fs::write(dir.path().join("css/b.css"), "b").unwrap();
        std::fs::write(dir.path().join("css/vendor/v.css"), "v").unwrap();
        std::fs::write(dir.path().join("js/app.js"), "x").unwrap();
        let root = Arc::new(FsDirectory::new(dir.path()).unwrap());
        (dir, PathTree::new(root, matching, skipped))
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let err = PathMatching::from_flags(true, true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadArgument);
    }

    #[test]
    fn test_exact_listing() {
        let (_dir, tree) = tree(PathMatching::Exact, vec![]);
        assert_eq!(tree.list("css/a.css").unwrap(), vec!["css/a.css"]);
        assert!(tree.list("css/*.css").unwrap().is_empty());
    }

    #[test]
    fn test_regex_listing_with_skip() {
        let (_dir, tree) = tree(PathMatching::Regex, vec!["css/vendor".to_string()]);
        assert_eq!(tree.list(r"css/.*\.css").unwrap(), vec!["css/a.css", "css/b.css"]);
    }

    #[test]
    fn test_wildcard_listing() {
        let (_dir, tree) = tree(PathMatching::Wildcard, vec![]);
        assert_eq!(
            tree.list("css/*.css").unwrap(),
            vec!["css/a.css", "css/b.css", "css/vendor/v.css"]
        );
        assert_eq!(tree.list("*.js").unwrap(), vec!["js/app.js"]);
        assert!(tree.list("missing/*.js").unwrap().is_empty());
    }

    #[test]
    fn test_wildcard_prefix_and_suffix_do_not_overlap() {
        let (_dir, tree) = tree(PathMatching::Wildcard, vec![]);
        assert!(tree.list("css/a*a.css").unwrap().is_empty());
        assert!(tree.list("css/a.c*.css").unwrap().is_empty());
        assert_eq!(tree.list("css/a*.css").unwrap(), vec!["css/a.css"]);
    }
}
