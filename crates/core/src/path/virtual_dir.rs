use super::{DirectoryPath, Path};
use crate::error::{NutpipeError, Result};
use std::sync::Arc;
use tracing::debug;

/// Union of several directories behind one logical root.
///
/// Lookups try members in registration order.
pub struct VirtualDirectory {
    name: String,
    members: Vec<Arc<dyn DirectoryPath>>,
}

impl VirtualDirectory {
    pub fn new(name: impl Into<String>, members: Vec<Arc<dyn DirectoryPath>>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn members(&self) -> &[Arc<dyn DirectoryPath>] {
        &self.members
    }
}

impl DirectoryPath for VirtualDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    /// Concatenation of every member listing, duplicates kept.
    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for member in &self.members {
            names.extend(member.list()?);
        }
        Ok(names)
    }

    /// A file shadows every later member. Directories of the same name in several members
    /// are unioned in turn.
    fn child_entry(&self, name: &str) -> Result<Path> {
        let mut dirs: Vec<Arc<dyn DirectoryPath>> = Vec::new();
        for member in &self.members {
            match member.child_entry(name) {
                Ok(Path::File(file)) if dirs.is_empty() => return Ok(Path::File(file)),
                Ok(Path::File(_)) => {}
                Ok(Path::Directory(dir)) => dirs.push(dir),
                Err(e) => debug!("{} has no {}: {}", member.name(), name, e),
            }
        }
        match dirs.len() {
            0 => Err(NutpipeError::not_found(format!("{name} in {}", self.name))),
            1 => Ok(Path::Directory(dirs.remove(0))),
            _ => Ok(Path::Directory(Arc::new(VirtualDirectory::new(name, dirs)))),
        }
    }

    fn last_update(&self) -> Result<u64> {
        let mut latest = 0;
        for member in &self.members {
            latest = latest.max(member.last_update()?);
        }
        Ok(latest)
    }
}
