//! Engine-level error types.

use staging::StagingError;
use thiserror::Error;
use trace::{ExecutionTrace, TraceError};

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// A module or port name cannot be used in an execution trace.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Two children of a composite share the same name.
    #[error("duplicate module name '{name}' in '{parent}'")]
    DuplicateModuleName { parent: String, name: String },

    #[error("module '{module}' declares port '{port}' twice")]
    DuplicatePort { module: String, port: String },

    /// A connection references a child that doesn't exist in the composite.
    #[error("connection references unknown module '{module}' ({side} side)")]
    UnknownModuleReference { module: String, side: &'static str },

    /// A connection references a port that doesn't exist in that direction.
    #[error("connection references unknown port '{module}.{port}' ({side} side)")]
    UnknownPort {
        module: String,
        port: String,
        side: &'static str,
    },

    /// Two connections feed the same input.
    #[error("port '{module}.{port}' is fed by more than one connection")]
    DuplicateConnection { module: String, port: String },

    /// A loop or proxy exposes a port its body or target doesn't have.
    #[error("module '{module}' exposes port '{port}' that '{inner}' lacks")]
    PortMismatch {
        module: String,
        port: String,
        inner: String,
    },

    /// Topological sort detected a cycle.
    #[error("child graph of '{module}' contains a cycle")]
    CycleDetected { module: String },

    // ------ Execution errors ------

    #[error("no implementation registered for module type '{module_type}' (at '{trace}')")]
    UnknownModuleType {
        trace: ExecutionTrace,
        module_type: String,
    },

    /// A module failed with a fatal error; the whole run is aborted.
    #[error("module at '{trace}' failed fatally: {message}")]
    ModuleFatal {
        trace: ExecutionTrace,
        message: String,
    },

    /// A module's retryable error was exhausted.
    #[error("module at '{trace}' exceeded retry limit: {message}")]
    ModuleRetryExhausted {
        trace: ExecutionTrace,
        message: String,
    },

    /// Error from the staging area.
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),
}
