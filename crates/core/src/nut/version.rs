//! Version numbers and the strategy deciding how a provider computes them.
//!
//! A [`VersionNumber`] is a handle that is either already known, being computed on the
//! rayon pool, or deferred to its first reader. Nut construction never blocks;
//! [`VersionNumber::value`] does.

use crate::error::{NutpipeError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use xxhash_rust::xxh3::Xxh3;

#[derive(Clone)]
pub struct VersionNumber {
    inner: Arc<VersionCell>,
}

struct VersionCell {
    value: OnceLock<std::result::Result<u64, String>>,
    pending: Mutex<Option<Pending>>,
}

enum Pending {
    Channel(Receiver<Result<u64>>),
    Deferred(Box<dyn FnOnce() -> Result<u64> + Send>),
}

impl VersionNumber {
    pub fn ready(value: u64) -> Self {
        let value_cell = OnceLock::new();
        let _ = value_cell.set(Ok(value));
        Self {
            inner: Arc::new(VersionCell {
                value: value_cell,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Runs `compute` on the rayon pool; the result is fetched on first [`value`](Self::value).
    pub fn spawn<F>(compute: F) -> Self
    where
        F: FnOnce() -> Result<u64> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        rayon::spawn(move || {
            let _ = tx.send(compute());
        });
        Self {
            inner: Arc::new(VersionCell {
                value: OnceLock::new(),
                pending: Mutex::new(Some(Pending::Channel(rx))),
            }),
        }
    }

    /// Runs `compute` on the thread that first asks for the value.
    pub fn deferred<F>(compute: F) -> Self
    where
        F: FnOnce() -> Result<u64> + Send + 'static,
    {
        Self {
            inner: Arc::new(VersionCell {
                value: OnceLock::new(),
                pending: Mutex::new(Some(Pending::Deferred(Box::new(compute)))),
            }),
        }
    }

    /// Computes in place when `compute_async` is false, otherwise on the rayon pool.
    pub fn compute<F>(compute_async: bool, compute: F) -> Self
    where
        F: FnOnce() -> Result<u64> + Send + 'static,
    {
        if compute_async {
            Self::spawn(compute)
        } else {
            match compute() {
                Ok(v) => Self::ready(v),
                Err(e) => Self::failed(e.to_string()),
            }
        }
    }

    fn failed(message: String) -> Self {
        let value_cell = OnceLock::new();
        let _ = value_cell.set(Err(message));
        Self {
            inner: Arc::new(VersionCell {
                value: value_cell,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Blocks until the version is available.
    pub fn value(&self) -> Result<u64> {
        let outcome = self.inner.value.get_or_init(|| {
            let pending = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match pending {
                Some(Pending::Channel(rx)) => match rx.recv() {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err("version computation was dropped".to_string()),
                },
                Some(Pending::Deferred(compute)) => compute().map_err(|e| e.to_string()),
                None => Err("version computation was never started".to_string()),
            }
        });
        outcome
            .clone()
            .map_err(|e| NutpipeError::BadState(format!("version unavailable: {e}")))
    }

    pub fn is_ready(&self) -> bool {
        self.inner.value.get().is_some()
    }
}

impl std::fmt::Debug for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.value.get() {
            Some(Ok(v)) => write!(f, "VersionNumber({v})"),
            Some(Err(e)) => write!(f, "VersionNumber(error: {e})"),
            None => write!(f, "VersionNumber(pending)"),
        }
    }
}

/// How a provider derives version numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionStrategy {
    /// Hash the content instead of using the last-modified timestamp.
    pub content_based: bool,
    /// Compute on a background task instead of blocking nut creation.
    pub compute_async: bool,
    /// Constant version overriding both modes.
    pub fixed_version: Option<u64>,
}

impl VersionStrategy {
    pub fn content_based() -> Self {
        Self {
            content_based: true,
            ..Self::default()
        }
    }

    pub fn timestamp() -> Self {
        Self::default()
    }

    pub fn with_async(mut self, compute_async: bool) -> Self {
        self.compute_async = compute_async;
        self
    }
}

/// Streams `reader` through xxh3.
pub fn content_hash(reader: &mut dyn Read) -> Result<u64> {
    let mut hasher = Xxh3::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.digest())
}

/// Combines component versions into the version of a composite.
pub fn combine_versions(versions: &[u64]) -> u64 {
    let mut hasher = Xxh3::new();
    for v in versions {
        hasher.update(&v.to_le_bytes());
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_value() {
        assert_eq!(VersionNumber::ready(42).value().unwrap(), 42);
    }

    #[test]
    fn test_spawned_value_is_shared_between_clones() {
        let version = VersionNumber::spawn(|| Ok(7));
        let clone = version.clone();
        assert_eq!(version.value().unwrap(), 7);
        assert!(clone.is_ready());
        assert_eq!(clone.value().unwrap(), 7);
    }

    #[test]
    fn test_deferred_runs_on_first_value() {
        let version = VersionNumber::deferred(|| Ok(3));
        assert!(!version.is_ready());
        assert_eq!(version.value().unwrap(), 3);
        assert!(version.is_ready());
    }

    #[test]
    fn test_failed_computation_reports_bad_state() {
        let version = VersionNumber::spawn(|| Err(NutpipeError::not_found("gone")));
        let err = version.value().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadState);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(&mut &b"body{}"[..]).unwrap();
        let b = content_hash(&mut &b"body{}"[..]).unwrap();
        let c = content_hash(&mut &b"body{ }"[..]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
