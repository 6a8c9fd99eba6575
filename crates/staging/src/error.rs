//! Typed error type for the staging crate.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use trace::{ExecutionTrace, TraceError};

/// Errors produced by staging-area operations.
///
/// Shape errors (`Trace`, `IllegalArgument`) are detected before any I/O is
/// scheduled. `Storage` means the store itself is broken; `Metadata` and
/// `Marshal` mean the stored content is.
#[derive(Debug, Error)]
pub enum StagingError {
    // ------ Argument errors ------

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    // ------ Operation errors ------

    #[error("no value stored at '{0}'")]
    NotFound(ExecutionTrace),

    #[error("storage failure at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt metadata at {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot marshal value at '{trace}': {message}")]
    Marshal {
        trace: ExecutionTrace,
        message: String,
    },

    #[error("cannot provide staging area: {0}")]
    Provision(String),

    /// The blocking task running the operation panicked or was aborted.
    #[error("staging task '{operation}' did not complete: {message}")]
    Task {
        operation: &'static str,
        message: String,
    },
}

impl StagingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StagingError::NotFound(_))
    }
}

/// `map_err` adapter attaching `path` to an I/O error.
pub(crate) fn storage(path: &Path) -> impl FnOnce(io::Error) -> StagingError + '_ {
    move |source| StagingError::Storage {
        path: path.to_path_buf(),
        source,
    }
}
