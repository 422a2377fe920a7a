use thiserror::Error;

/// Coarse classification shared by every failure the pipeline reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BadArgument,
    Io,
    UnsupportedOperation,
    BadState,
}

#[derive(Error, Debug)]
pub enum NutpipeError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad argument: {0}")]
    BadArgument(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("Bad state: {0}")]
    BadState(String),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(String),
}

impl NutpipeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NutpipeError::NotFound(_) => ErrorKind::NotFound,
            NutpipeError::BadArgument(_) | NutpipeError::Json(_) => ErrorKind::BadArgument,
            NutpipeError::Io(_) | NutpipeError::Http(_) => ErrorKind::Io,
            NutpipeError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            NutpipeError::BadState(_) => ErrorKind::BadState,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        NutpipeError::NotFound(what.into())
    }

    pub fn bad_argument(what: impl Into<String>) -> Self {
        NutpipeError::BadArgument(what.into())
    }

    /// I/O errors reporting a missing file surface as `NotFound`.
    pub fn from_io(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            NutpipeError::NotFound(what.to_string())
        } else {
            NutpipeError::Io(err)
        }
    }
}

impl From<zip::result::ZipError> for NutpipeError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::FileNotFound => NutpipeError::NotFound(err.to_string()),
            zip::result::ZipError::Io(io) => NutpipeError::Io(io),
            other => NutpipeError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

impl From<regex::Error> for NutpipeError {
    fn from(err: regex::Error) -> Self {
        NutpipeError::BadArgument(err.to_string())
    }
}

impl From<reqwest::Error> for NutpipeError {
    fn from(err: reqwest::Error) -> Self {
        NutpipeError::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NutpipeError>;
