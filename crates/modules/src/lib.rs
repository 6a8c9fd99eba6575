//! `modules` crate: the `SimpleModule` trait and built-in module implementations.
//!
//! Every leaf module of a workflow is executed through [`SimpleModule`]. The
//! engine crate looks implementations up by module type in a
//! [`ModuleRegistry`] and handles staging and retries around them.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod traits;

pub use error::ModuleError;
pub use traits::{ExecutionContext, ModuleRegistry, PortValues, SimpleModule};
