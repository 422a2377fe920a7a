//! The nut model: a named, typed, versioned resource.
//!
//! ```text
//!                 ┌──────────────┐ originals  ┌──────────────┐
//!   engine ─────> │  derived nut │ ─────────> │ provider nut │ ──> StreamSource::open(path)
//!                 └──────────────┘            └──────────────┘
//!                        │ referenced
//!                        v
//!                 ┌──────────────┐
//!                 │ image / css  │  (append-only, never cyclic)
//!                 └──────────────┘
//! ```
//!
//! Identity (name, type, version) is fixed at construction. Content is either streamed
//! lazily from a provider, held in memory, concatenated from components or produced by a
//! [`Transformer`] on every open.

pub mod composite;
pub mod nut_type;
pub mod version;

pub use composite::Combiner;
pub use nut_type::NutType;
pub use version::{VersionNumber, VersionStrategy};

use crate::error::{NutpipeError, Result};
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, PoisonError, RwLock};

/// Anything able to open a raw stream for a provider-relative path.
pub trait StreamSource: Send + Sync {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;
}

/// Opaque content transformation (compression, minification, ...).
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NutFlags {
    pub compressed: bool,
    pub aggregatable: bool,
    pub text_reducible: bool,
    pub cacheable: bool,
}

impl Default for NutFlags {
    fn default() -> Self {
        Self {
            compressed: false,
            aggregatable: true,
            text_reducible: true,
            cacheable: true,
        }
    }
}

#[derive(Clone)]
pub enum NutContent {
    Source {
        source: Arc<dyn StreamSource>,
        path: String,
    },
    Bytes(Arc<[u8]>),
    Composite {
        parts: Vec<Arc<Nut>>,
        separator: Option<Arc<[u8]>>,
    },
    Transformed {
        input: Arc<Nut>,
        transformer: Arc<dyn Transformer>,
    },
}

pub struct Nut {
    name: String,
    nut_type: NutType,
    version: VersionNumber,
    flags: NutFlags,
    proxy_uri: Option<String>,
    content: NutContent,
    originals: Vec<Arc<Nut>>,
    referenced: RwLock<Vec<Arc<Nut>>>,
}

impl Nut {
    pub fn builder(name: impl Into<String>, nut_type: NutType) -> NutBuilder {
        NutBuilder::new(name, nut_type)
    }

    /// In-memory nut whose version is the hash of `bytes`.
    pub fn from_bytes(
        name: impl Into<String>,
        nut_type: NutType,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Arc<Nut> {
        let bytes: Arc<[u8]> = bytes.into();
        let version = VersionNumber::ready(xxhash_rust::xxh3::xxh3_64(&bytes));
        Arc::new(Nut {
            name: name.into(),
            nut_type,
            version,
            flags: NutFlags::default(),
            proxy_uri: None,
            content: NutContent::Bytes(bytes),
            originals: Vec::new(),
            referenced: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nut_type(&self) -> NutType {
        self.nut_type
    }

    pub fn version(&self) -> &VersionNumber {
        &self.version
    }

    /// Blocks until the version number is known.
    pub fn version_number(&self) -> Result<u64> {
        self.version.value()
    }

    pub fn flags(&self) -> NutFlags {
        self.flags
    }

    pub fn is_compressed(&self) -> bool {
        self.flags.compressed
    }

    pub fn is_aggregatable(&self) -> bool {
        self.flags.aggregatable
    }

    pub fn is_text_reducible(&self) -> bool {
        self.flags.text_reducible
    }

    pub fn is_cacheable(&self) -> bool {
        self.flags.cacheable
    }

    pub fn proxy_uri(&self) -> Option<&str> {
        self.proxy_uri.as_deref()
    }

    pub fn content(&self) -> &NutContent {
        &self.content
    }

    pub fn original_nuts(&self) -> &[Arc<Nut>] {
        &self.originals
    }

    /// Name of the first provider-backed ancestor, or this name when there is none.
    pub fn initial_name(&self) -> &str {
        match self.originals.first() {
            Some(original) => original.initial_name(),
            None => &self.name,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.content, NutContent::Composite { .. })
    }

    pub fn components(&self) -> &[Arc<Nut>] {
        match &self.content {
            NutContent::Composite { parts, .. } => parts,
            _ => &[],
        }
    }

    pub fn referenced_nuts(&self) -> Vec<Arc<Nut>> {
        self.referenced
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Appends to the referenced set. No dedup: callers must not introduce cycles.
    pub fn add_referenced_nut(&self, nut: Arc<Nut>) {
        self.referenced
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(nut);
    }

    /// Opens a fresh stream over the content. Every call is independent.
    pub fn open_stream(&self) -> Result<Box<dyn Read + Send>> {
        match &self.content {
            NutContent::Source { source, path } => source.open(path),
            NutContent::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            NutContent::Composite { parts, separator } => {
                let mut stream: Box<dyn Read + Send> = Box::new(std::io::empty());
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        if let Some(sep) = separator {
                            stream = Box::new(stream.chain(Cursor::new(sep.clone())));
                        }
                    }
                    stream = Box::new(stream.chain(part.open_stream()?));
                }
                Ok(stream)
            }
            NutContent::Transformed { input, transformer } => {
                let mut reader = input.open_stream()?;
                let mut out = Vec::new();
                transformer.transform(&mut reader, &mut out)?;
                Ok(Box::new(Cursor::new(out)))
            }
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.open_stream()?
            .read_to_end(&mut out)
            .map_err(NutpipeError::Io)?;
        Ok(out)
    }

    pub fn read_string(&self) -> Result<String> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| NutpipeError::bad_argument(format!("{} is not UTF-8: {e}", self.name)))
    }

    /// Copies the content into memory. Referenced nuts are materialized too.
    pub fn materialize(self: &Arc<Self>) -> Result<Arc<Nut>> {
        if matches!(self.content, NutContent::Bytes(_)) {
            return Ok(self.clone());
        }
        let bytes = self.read_bytes()?;
        let referenced = self
            .referenced_nuts()
            .iter()
            .map(|r| r.materialize())
            .collect::<Result<Vec<_>>>()?;
        NutBuilder::derived(self)
            .bytes(bytes)
            .referenced(referenced)
            .build()
    }

    /// Same content under another name.
    pub fn renamed(self: &Arc<Self>, name: impl Into<String>) -> Result<Arc<Nut>> {
        NutBuilder::derived(self)
            .name(name)
            .content(self.content.clone())
            .build()
    }
}

impl std::fmt::Debug for Nut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nut")
            .field("name", &self.name)
            .field("type", &self.nut_type)
            .field("version", &self.version)
            .field("flags", &self.flags)
            .finish()
    }
}

pub struct NutBuilder {
    name: String,
    nut_type: NutType,
    version: Option<VersionNumber>,
    flags: NutFlags,
    proxy_uri: Option<String>,
    content: Option<NutContent>,
    originals: Vec<Arc<Nut>>,
    referenced: Vec<Arc<Nut>>,
}

impl NutBuilder {
    pub fn new(name: impl Into<String>, nut_type: NutType) -> Self {
        Self {
            name: name.into(),
            nut_type,
            version: None,
            flags: NutFlags::default(),
            proxy_uri: None,
            content: None,
            originals: Vec::new(),
            referenced: Vec::new(),
        }
    }

    /// Starts from the identity of `from`, recording it as the single original.
    pub fn derived(from: &Arc<Nut>) -> Self {
        Self {
            name: from.name.clone(),
            nut_type: from.nut_type,
            version: Some(from.version.clone()),
            flags: from.flags,
            proxy_uri: from.proxy_uri.clone(),
            content: None,
            originals: vec![from.clone()],
            referenced: from.referenced_nuts(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: VersionNumber) -> Self {
        self.version = Some(version);
        self
    }

    pub fn flags(mut self, flags: NutFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn compressed(mut self, compressed: bool) -> Self {
        self.flags.compressed = compressed;
        self
    }

    pub fn proxy_uri(mut self, proxy_uri: Option<String>) -> Self {
        self.proxy_uri = proxy_uri;
        self
    }

    pub fn content(mut self, content: NutContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn bytes(self, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.content(NutContent::Bytes(bytes.into()))
    }

    pub fn source(self, source: Arc<dyn StreamSource>, path: impl Into<String>) -> Self {
        self.content(NutContent::Source {
            source,
            path: path.into(),
        })
    }

    pub fn transformed(self, input: Arc<Nut>, transformer: Arc<dyn Transformer>) -> Self {
        self.content(NutContent::Transformed { input, transformer })
    }

    pub fn originals(mut self, originals: Vec<Arc<Nut>>) -> Self {
        self.originals = originals;
        self
    }

    pub fn referenced(mut self, referenced: Vec<Arc<Nut>>) -> Self {
        self.referenced = referenced;
        self
    }

    pub fn build(self) -> Result<Arc<Nut>> {
        let content = self.content.ok_or_else(|| {
            NutpipeError::BadState(format!("nut '{}' built without content", self.name))
        })?;
        let version = match (self.version, &content) {
            (Some(v), _) => v,
            (None, NutContent::Bytes(bytes)) => {
                VersionNumber::ready(xxhash_rust::xxh3::xxh3_64(bytes))
            }
            (None, _) => {
                return Err(NutpipeError::BadState(format!(
                    "nut '{}' built without version",
                    self.name
                )));
            }
        };
        Ok(Arc::new(Nut {
            name: self.name,
            nut_type: self.nut_type,
            version,
            flags: self.flags,
            proxy_uri: self.proxy_uri,
            content,
            originals: self.originals,
            referenced: RwLock::new(self.referenced),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct MissingSource;

    impl StreamSource for MissingSource {
        fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
            Err(NutpipeError::not_found(path))
        }
    }

    struct Upper;

    impl Transformer for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn transform(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<()> {
            let mut s = String::new();
            input.read_to_string(&mut s)?;
            output.write_all(s.to_uppercase().as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn test_open_stream_is_repeatable() {
        let nut = Nut::from_bytes("a.css", NutType::Css, b"body{}".to_vec());
        assert_eq!(nut.read_bytes().unwrap(), b"body{}");
        assert_eq!(nut.read_bytes().unwrap(), b"body{}");
    }

    #[test]
    fn test_unreachable_source_fails_not_found() {
        let nut = Nut::builder("gone.css", NutType::Css)
            .source(Arc::new(MissingSource), "gone.css")
            .version(VersionNumber::ready(1))
            .build()
            .unwrap();
        assert_eq!(nut.open_stream().err().unwrap().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_transformed_nut_keeps_original() {
        let original = Nut::from_bytes("a.js", NutType::Javascript, b"var a;".to_vec());
        let derived = NutBuilder::derived(&original)
            .transformed(original.clone(), Arc::new(Upper))
            .build()
            .unwrap();
        assert_eq!(derived.read_string().unwrap(), "VAR A;");
        assert!(Arc::ptr_eq(&derived.original_nuts()[0], &original));
        assert_eq!(original.read_string().unwrap(), "var a;");
    }

    #[test]
    fn test_add_referenced_nut_appends() {
        let nut = Nut::from_bytes("a.css", NutType::Css, b"a".to_vec());
        let img = Nut::from_bytes("a.png", NutType::Png, vec![1u8, 2, 3]);
        nut.add_referenced_nut(img.clone());
        nut.add_referenced_nut(img);
        assert_eq!(nut.referenced_nuts().len(), 2);
    }

    #[test]
    fn test_materialize_copies_referenced() {
        let original = Nut::from_bytes("a.js", NutType::Javascript, b"x".to_vec());
        let derived = NutBuilder::derived(&original)
            .transformed(original.clone(), Arc::new(Upper))
            .build()
            .unwrap();
        derived.add_referenced_nut(Nut::from_bytes("b.js", NutType::Javascript, b"y".to_vec()));
        let materialized = derived.materialize().unwrap();
        assert!(matches!(materialized.content(), NutContent::Bytes(_)));
        assert_eq!(materialized.read_string().unwrap(), "X");
        assert_eq!(materialized.referenced_nuts().len(), 1);
    }
}
