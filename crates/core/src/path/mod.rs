//! Virtual path layer.
//!
//! A uniform directory/file tree over three kinds of storage:
//!
//! ```text
//!   VirtualDirectory (union, first member wins)
//!     ├── FsDirectory ── FsFile
//!     │        └── assets.jar ──> ArchiveDirectory ── ArchiveFile
//!     │                                  └── nested.zip ──> ArchiveDirectory (in memory)
//!     └── ArchiveDirectory
//! ```
//!
//! Archives are detected by their magic bytes and entered transparently, so callers only
//! ever call [`DirectoryPath::child`].

pub mod archive;
pub mod fs;
pub mod virtual_dir;

pub use archive::{ArchiveDirectory, ArchiveFile};
pub use fs::{FsDirectory, FsFile};
pub use virtual_dir::VirtualDirectory;

use crate::error::{NutpipeError, Result};
use crate::util::simplify_path;
use std::io::Read;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

pub trait FilePath: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self) -> Result<Box<dyn Read + Send>>;

    /// Last modification in milliseconds since the epoch.
    fn last_update(&self) -> Result<u64>;
}

pub trait DirectoryPath: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the direct children.
    fn list(&self) -> Result<Vec<String>>;

    /// Direct child called `name`.
    fn child_entry(&self, name: &str) -> Result<Path>;

    /// Last modification in milliseconds since the epoch.
    fn last_update(&self) -> Result<u64>;

    /// Walks a slash-separated relative path, entering nested archives on the way.
    fn child(&self, relative: &str) -> Result<Path> {
        let simplified = simplify_path(relative.trim_start_matches('/'))?;
        let mut segments = simplified.split('/').filter(|s| !s.is_empty());
        let first = segments
            .next()
            .ok_or_else(|| NutpipeError::bad_argument(format!("empty child path in {}", self.name())))?;

        let mut current = self.child_entry(first)?;
        for segment in segments {
            current = match current {
                Path::Directory(dir) => dir.child_entry(segment)?,
                Path::File(file) => {
                    return Err(NutpipeError::bad_argument(format!(
                        "{} is not a directory while resolving {relative}",
                        file.name()
                    )));
                }
            };
        }
        Ok(current)
    }
}

#[derive(Clone)]
pub enum Path {
    Directory(Arc<dyn DirectoryPath>),
    File(Arc<dyn FilePath>),
}

impl Path {
    pub fn name(&self) -> &str {
        match self {
            Path::Directory(d) => d.name(),
            Path::File(f) => f.name(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Path::File(_))
    }

    pub fn last_update(&self) -> Result<u64> {
        match self {
            Path::Directory(d) => d.last_update(),
            Path::File(f) => f.last_update(),
        }
    }

    pub fn into_file(self) -> Result<Arc<dyn FilePath>> {
        match self {
            Path::File(f) => Ok(f),
            Path::Directory(d) => Err(NutpipeError::bad_argument(format!(
                "{} is a directory",
                d.name()
            ))),
        }
    }

    pub fn into_directory(self) -> Result<Arc<dyn DirectoryPath>> {
        match self {
            Path::Directory(d) => Ok(d),
            Path::File(f) => Err(NutpipeError::bad_argument(format!(
                "{} is not a directory",
                f.name()
            ))),
        }
    }
}

impl std::fmt::Debug for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Path::Directory(d) => write!(f, "Directory({})", d.name()),
            Path::File(file) => write!(f, "File({})", file.name()),
        }
    }
}

/// Resolves a filesystem location, entering archives found along the way.
///
/// `/libs/assets.jar/META-INF/resources` yields the `META-INF/resources` directory inside
/// the jar.
pub fn build_path(location: &std::path::Path) -> Result<Path> {
    for ancestor in location.ancestors() {
        if ancestor.as_os_str().is_empty() || !ancestor.exists() {
            continue;
        }
        let resolved = fs::entry_for(ancestor)?;
        if ancestor == location {
            return Ok(resolved);
        }
        let rest = location
            .strip_prefix(ancestor)
            .map_err(|e| NutpipeError::bad_argument(e.to_string()))?;
        let relative = rest
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        return match resolved {
            Path::Directory(dir) => dir.child(&relative),
            Path::File(_) => Err(NutpipeError::not_found(location.display().to_string())),
        };
    }
    Err(NutpipeError::not_found(location.display().to_string()))
}

pub(crate) fn is_archive_header(header: &[u8]) -> bool {
    header.len() >= 4 && header[..4] == ZIP_MAGIC
}

pub(crate) fn millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
