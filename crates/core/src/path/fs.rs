use super::archive::ArchiveDirectory;
use super::{DirectoryPath, FilePath, Path, is_archive_header, millis};
use crate::error::{NutpipeError, Result};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

pub struct FsDirectory {
    name: String,
    location: PathBuf,
}

impl FsDirectory {
    pub fn new(location: impl Into<PathBuf>) -> Result<Self> {
        let location = location.into();
        if !location.is_dir() {
            return Err(NutpipeError::bad_argument(format!(
                "{} is not a directory",
                location.display()
            )));
        }
        Ok(Self {
            name: display_name(&location),
            location,
        })
    }

    pub fn location(&self) -> &std::path::Path {
        &self.location
    }
}

impl DirectoryPath for FsDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.location)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn child_entry(&self, name: &str) -> Result<Path> {
        let location = self.location.join(name);
        if !location.exists() {
            return Err(NutpipeError::not_found(location.display().to_string()));
        }
        entry_for(&location)
    }

    fn last_update(&self) -> Result<u64> {
        let meta = std::fs::metadata(&self.location)?;
        Ok(millis(meta.modified()?))
    }
}

pub struct FsFile {
    name: String,
    location: PathBuf,
}

impl FsFile {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        Self {
            name: display_name(&location),
            location,
        }
    }
}

impl FilePath for FsFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let file = File::open(&self.location)
            .map_err(|e| NutpipeError::from_io(e, &self.location.display().to_string()))?;
        Ok(Box::new(file))
    }

    fn last_update(&self) -> Result<u64> {
        let meta = std::fs::metadata(&self.location)
            .map_err(|e| NutpipeError::from_io(e, &self.location.display().to_string()))?;
        Ok(millis(meta.modified()?))
    }
}

/// Wraps an existing filesystem entry: directory, archive or plain file.
pub(crate) fn entry_for(location: &std::path::Path) -> Result<Path> {
    if location.is_dir() {
        return Ok(Path::Directory(Arc::new(FsDirectory::new(location)?)));
    }
    if sniff_archive(location)? {
        let archive = ArchiveDirectory::open_file(location)?;
        return Ok(Path::Directory(Arc::new(archive)));
    }
    Ok(Path::File(Arc::new(FsFile::new(location))))
}

fn sniff_archive(location: &std::path::Path) -> Result<bool> {
    let mut header = [0u8; 4];
    let mut file = File::open(location)?;
    let mut read = 0;
    while read < header.len() {
        let n = file.read(&mut header[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok(is_archive_header(&header[..read]))
}

fn display_name(location: &std::path::Path) -> String {
    location
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.display().to_string())
}
