//! Error types for recopy.
//!
//! Every error carries a stable code so the workflow engine (and whatever UI
//! sits behind it) can tell a bad configuration apart from a storage failure
//! without parsing messages.

use thiserror::Error;

/// Result type alias for recopy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// recopy error types.
///
/// `Config`, `NotFound` and `Persistence` are the failures a duplication can
/// report. The rest come from the engine-side plumbing around it.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unusable node configuration.
    #[error("{0}")]
    Config(String),

    /// Unknown collection, source record or job.
    #[error("{0}")]
    NotFound(String),

    /// The collection store rejected a read or a write.
    #[error("{0}")]
    Persistence(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Persistence(_) => "PERSISTENCE_ERROR",
            Error::Node(_) => "NODE_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Debug rendering of the error and its source chain.
    ///
    /// Rust errors carry no stack, so the chain stands in for the trace the
    /// engine shows next to the message.
    pub fn trace(&self) -> String {
        let mut trace = format!("{}: {:?}", self.code(), self);
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            trace.push_str("\ncaused by: ");
            trace.push_str(&err.to_string());
            source = err.source();
        }
        trace
    }
}
