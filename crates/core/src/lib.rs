//! Asset pipeline: resolves heaps of front-end resources through pluggable providers and
//! runs them through ordered engine chains.

pub mod config;
pub mod context;
pub mod dao;
pub mod engine;
pub mod error;
pub mod heap;
pub mod logging;
pub mod nut;
pub mod path;
pub mod util;

pub use error::{ErrorKind, NutpipeError, Result};
