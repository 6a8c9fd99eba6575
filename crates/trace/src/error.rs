//! Trace-level error types.

use thiserror::Error;

/// Errors produced while building, parsing or querying an execution trace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    // ------ Parse / grammar errors ------

    /// Wraps any failure that occurred while parsing `input`.
    #[error("cannot parse execution trace '{input}': {source}")]
    Parse {
        input: String,
        #[source]
        source: Box<TraceError>,
    },

    /// A fragment of the input does not form a valid token.
    #[error("unexpected '{fragment}' at offset {offset}")]
    Syntax { fragment: String, offset: usize },

    /// Not an identifier (`[A-Za-z_][A-Za-z0-9_]*`).
    #[error("invalid name '{0}'")]
    InvalidName(String),

    /// Not a canonical non-negative decimal integer.
    #[error("invalid index '{0}'")]
    InvalidIndex(String),

    /// The element sequence is outside the trace grammar.
    #[error("illegal execution trace: element signature '{signature}' is not permitted")]
    Illegal { signature: String },

    // ------ Bounds errors ------

    /// Type, key, name or index was requested from the empty trace.
    #[error("the empty execution trace has no {0}")]
    Empty(&'static str),

    /// Slice bound past the end of the trace.
    #[error("index {index} out of bounds for execution trace of length {len}")]
    OutOfBounds { index: usize, len: usize },

    // ------ Argument errors ------

    /// `begin > end` in a slice.
    #[error("invalid range {begin}..{end}")]
    InvalidRange { begin: usize, end: usize },

    /// The last element carries a different kind of key than requested.
    #[error("execution trace '{trace}' does not end in an element with a {expected} key")]
    KeyMismatch {
        trace: String,
        expected: &'static str,
    },
}
