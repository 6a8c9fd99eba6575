//! `engine` crate: workflow module model, validation, and the local interpreter.

pub mod dag;
pub mod error;
pub mod executor;
pub mod models;

pub use dag::{validate, validate_dag};
pub use error::EngineError;
pub use executor::{port_values, ExecutionResult, Interpreter, InterpreterConfig};
pub use models::{Connection, Endpoint, Module, ModuleBody};
