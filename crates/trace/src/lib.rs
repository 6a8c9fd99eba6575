//! `trace` crate: the execution-trace algebra.
//!
//! An [`ExecutionTrace`] addresses a module, loop iteration, port or array
//! element inside a workflow run. Traces are immutable values built by the
//! `resolve_*` family or parsed from their canonical string form, and they are
//! the key space of every staging area.

pub mod element;
pub mod error;
pub mod grammar;
pub mod key;
mod parse;
pub mod trace;

pub use element::{Element, ElementType};
pub use error::TraceError;
pub use key::{Index, Key, Name};
pub use trace::ExecutionTrace;
