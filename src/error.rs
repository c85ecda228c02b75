//! Error types for lsi-search.

use thiserror::Error;

/// Top-level error type.
///
/// Everything except `DimensionMismatch` is a load-time or fit-time failure:
/// a service that hits one of them never reaches the ready state. The one
/// query-time `Format` is a NaN score, which fails the query instead of
/// dropping the document.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or mutually inconsistent artifacts, or an impossible fit request.
    #[error("config error: {0}")]
    Config(String),

    /// Structurally invalid corpus or model artifact.
    #[error("format error: {0}")]
    Format(String),

    /// Artifact missing or unreadable.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed term dictionary.
    #[error("validation error: {0}")]
    Validation(String),

    /// A vector reached a component built for a different dimension.
    #[error("{what} dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

impl From<serde_cbor::Error> for Error {
    fn from(e: serde_cbor::Error) -> Self {
        Error::Format(e.to_string())
    }
}

/// Result type for lsi-search operations.
pub type Result<T> = std::result::Result<T, Error>;
