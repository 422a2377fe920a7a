use super::{DirectoryPath, FilePath, Path, is_archive_header, millis};
use crate::error::{NutpipeError, Result};
use indexmap::IndexSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use zip::ZipArchive;

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// Where the archive bytes live. Nested archives are held in memory.
enum ArchiveSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

struct Archive {
    source: ArchiveSource,
    /// Last update of the outermost container on disk.
    last_update: u64,
    entries: OnceLock<Vec<String>>,
}

impl Archive {
    fn open(&self) -> Result<ZipArchive<Box<dyn ReadSeek>>> {
        let reader: Box<dyn ReadSeek> = match &self.source {
            ArchiveSource::File(path) => Box::new(File::open(path)?),
            ArchiveSource::Memory(bytes) => Box::new(Cursor::new(bytes.clone())),
        };
        Ok(ZipArchive::new(reader)?)
    }

    fn entries(&self) -> Result<&[String]> {
        if let Some(entries) = self.entries.get() {
            return Ok(entries);
        }
        let archive = self.open()?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        Ok(self.entries.get_or_init(|| names))
    }

    fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.open()?;
        let mut entry = archive.by_name(name)?;
        let mut out = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut out)?;
        Ok(out)
    }

    fn entry_header(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.open()?;
        let entry = archive.by_name(name)?;
        let mut header = Vec::with_capacity(4);
        entry.take(4).read_to_end(&mut header)?;
        Ok(header)
    }
}

/// A directory inside an archive, or the archive root when `prefix` is empty.
pub struct ArchiveDirectory {
    name: String,
    archive: Arc<Archive>,
    prefix: String,
}

impl ArchiveDirectory {
    pub fn open_file(location: &std::path::Path) -> Result<Self> {
        let last_update = millis(std::fs::metadata(location)?.modified()?);
        let name = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive = Archive {
            source: ArchiveSource::File(location.to_path_buf()),
            last_update,
            entries: OnceLock::new(),
        };
        archive.entries()?;
        Ok(Self {
            name,
            archive: Arc::new(archive),
            prefix: String::new(),
        })
    }

    fn nested(name: &str, bytes: Vec<u8>, last_update: u64) -> Result<Self> {
        let archive = Archive {
            source: ArchiveSource::Memory(Arc::from(bytes)),
            last_update,
            entries: OnceLock::new(),
        };
        archive.entries()?;
        Ok(Self {
            name: name.to_string(),
            archive: Arc::new(archive),
            prefix: String::new(),
        })
    }
}

impl DirectoryPath for ArchiveDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = IndexSet::new();
        for entry in self.archive.entries()? {
            let Some(rest) = entry.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            let first = rest.split('/').next().unwrap_or("");
            if !first.is_empty() {
                names.insert(first.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    fn child_entry(&self, name: &str) -> Result<Path> {
        let full = format!("{}{}", self.prefix, name);
        let dir_prefix = format!("{full}/");
        let entries = self.archive.entries()?;

        if entries.iter().any(|e| e.starts_with(&dir_prefix)) {
            return Ok(Path::Directory(Arc::new(ArchiveDirectory {
                name: name.to_string(),
                archive: self.archive.clone(),
                prefix: dir_prefix,
            })));
        }

        if !entries.iter().any(|e| *e == full) {
            return Err(NutpipeError::not_found(format!("{}!/{full}", self.name)));
        }

        if is_archive_header(&self.archive.entry_header(&full)?) {
            let bytes = self.archive.read_entry(&full)?;
            let nested = ArchiveDirectory::nested(name, bytes, self.archive.last_update)?;
            return Ok(Path::Directory(Arc::new(nested)));
        }

        Ok(Path::File(Arc::new(ArchiveFile {
            name: name.to_string(),
            archive: self.archive.clone(),
            entry: full,
        })))
    }

    fn last_update(&self) -> Result<u64> {
        Ok(self.archive.last_update)
    }
}

pub struct ArchiveFile {
    name: String,
    archive: Arc<Archive>,
    entry: String,
}

impl FilePath for ArchiveFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<Box<dyn Read + Send>> {
        let bytes = self.archive.read_entry(&self.entry)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn last_update(&self) -> Result<u64> {
        Ok(self.archive.last_update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_lists_implicit_directories() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("assets.jar");
        std::fs::write(
            &jar,
            zip_bytes(&[
                ("css/a.css", b"a{}".as_slice()),
                ("css/b.css", b"b{}".as_slice()),
                ("js/app.js", b"x".as_slice()),
            ]),
        )
        .unwrap();

        let root = ArchiveDirectory::open_file(&jar).unwrap();
        assert_eq!(root.list().unwrap(), vec!["css", "js"]);

        let css = root.child("css").unwrap().into_directory().unwrap();
        assert_eq!(css.list().unwrap(), vec!["a.css", "b.css"]);
    }

    #[test]
    fn test_nested_archive_is_entered() {
        let inner = zip_bytes(&[("static/app.js", b"console.log(1)".as_slice())]);
        let dir = tempdir().unwrap();
        let outer = dir.path().join("outer.zip");
        std::fs::write(&outer, zip_bytes(&[("lib/inner.jar", inner.as_slice())])).unwrap();

        let root = ArchiveDirectory::open_file(&outer).unwrap();
        let file = root
            .child("lib/inner.jar/static/app.js")
            .unwrap()
            .into_file()
            .unwrap();
        let mut content = String::new();
        file.open().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "console.log(1)");
        assert_eq!(file.last_update().unwrap(), root.last_update().unwrap());
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("a.zip");
        std::fs::write(&jar, zip_bytes(&[("a.css", b"a".as_slice())])).unwrap();
        let root = ArchiveDirectory::open_file(&jar).unwrap();
        let err = root.child("b.css").err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
