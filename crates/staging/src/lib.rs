//! `staging` crate: hierarchical storage of intermediate workflow values.
//!
//! Defines the [`StagingArea`] contract, a file-system-backed implementation
//! using hard links for cheap copies, an in-memory implementation, and the
//! providers that let a staging area be reconstructed in another process.
//! Knows nothing about how modules execute.

pub mod area;
pub mod error;
pub mod file;
pub mod lookup;
pub mod memory;
pub mod provider;
pub mod report;
pub mod tree;

pub use area::StagingArea;
pub use error::StagingError;
pub use file::{FileStagingArea, FileStagingAreaConfig};
pub use lookup::{ModuleKind, ModuleLookup};
pub use memory::InMemoryStagingArea;
pub use provider::{
    CurrentRuntime, FileStagingAreaDescriptor, InstanceProvider, RuntimeContext,
    StagingAreaDescriptor, StagingAreaProvider,
};
pub use report::{ErrorKind, ErrorReport};
pub use tree::{ByteSequence, SerializationTree, JSON_MARSHALER};
