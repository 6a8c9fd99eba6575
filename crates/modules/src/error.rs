//! Module-level error type.

use thiserror::Error;

/// Errors returned by a module's `execute` method.
///
/// The interpreter uses the variant to decide retry behaviour:
/// - `Retryable`: the module is executed again after an exponential back-off.
/// - `Fatal`: the run is aborted immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// Transient failure; the interpreter should retry.
    #[error("retryable module error: {0}")]
    Retryable(String),

    /// Permanent failure, including malformed inputs.
    #[error("fatal module error: {0}")]
    Fatal(String),
}
