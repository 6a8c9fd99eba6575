//! Staging-area providers: how staging-area access crosses a process boundary.
//!
//! A provider is either a live handle (usable only within this process) or a
//! serializable descriptor that [`StagingAreaProvider::provide`] turns back
//! into a live staging area with the help of an [`InstanceProvider`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use trace::ExecutionTrace;

use crate::file::{FileStagingArea, FileStagingAreaConfig};
use crate::lookup::ModuleLookup;
use crate::{StagingArea, StagingError};

/// Runtime services a reconstructed staging area needs.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Runtime on which blocking file-system work is scheduled.
    pub executor: Handle,
}

impl RuntimeContext {
    /// Context backed by the tokio runtime of the calling task.
    pub fn current() -> Result<Self, StagingError> {
        Handle::try_current()
            .map(|executor| Self { executor })
            .map_err(|e| StagingError::Provision(e.to_string()))
    }
}

/// Looks up the process-local instances needed during reconstruction.
pub trait InstanceProvider: Send + Sync {
    fn runtime_context(&self) -> Result<RuntimeContext, StagingError>;

    /// Module information to attach to reconstructed staging areas.
    fn module_lookup(&self) -> Option<Arc<dyn ModuleLookup>> {
        None
    }
}

/// Serves the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentRuntime;

impl InstanceProvider for CurrentRuntime {
    fn runtime_context(&self) -> Result<RuntimeContext, StagingError> {
        RuntimeContext::current()
    }
}

/// Reconstruction data for a file-backed staging area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStagingAreaDescriptor {
    pub base_path: PathBuf,
    pub trace: ExecutionTrace,
    #[serde(default)]
    pub hard_link_eligible_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StagingAreaDescriptor {
    File(FileStagingAreaDescriptor),
}

impl StagingAreaDescriptor {
    pub fn reconstruct(
        &self,
        instances: &dyn InstanceProvider,
    ) -> Result<Arc<dyn StagingArea>, StagingError> {
        match self {
            StagingAreaDescriptor::File(file) => {
                let context = instances.runtime_context()?;
                let config = FileStagingAreaConfig {
                    base_path: file.base_path.clone(),
                    hard_link_eligible_paths: file.hard_link_eligible_paths.clone(),
                };
                let mut root = FileStagingArea::new(config, context.executor);
                if let Some(lookup) = instances.module_lookup() {
                    root = root.with_module_lookup(lookup);
                }
                Ok(Arc::new(root.scoped_to(file.trace.clone())))
            }
        }
    }
}

/// How to obtain a staging area.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingAreaProvider {
    /// An in-process instance. Cannot be serialized.
    #[serde(skip)]
    Live(Arc<dyn StagingArea>),
    Descriptor(StagingAreaDescriptor),
}

impl StagingAreaProvider {
    pub fn provide(
        &self,
        instances: &dyn InstanceProvider,
    ) -> Result<Arc<dyn StagingArea>, StagingError> {
        match self {
            StagingAreaProvider::Live(area) => Ok(Arc::clone(area)),
            StagingAreaProvider::Descriptor(descriptor) => descriptor.reconstruct(instances),
        }
    }

    pub fn is_serializable(&self) -> bool {
        matches!(self, StagingAreaProvider::Descriptor(_))
    }
}
