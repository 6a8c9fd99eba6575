//! The `StagingArea` contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use trace::{ElementType, ExecutionTrace, Index};

use crate::lookup::{ModuleKind, ModuleLookup};
use crate::provider::StagingAreaProvider;
use crate::tree::SerializationTree;
use crate::StagingError;

/// A hierarchical key-value store keyed by execution traces.
///
/// Every instance is scoped to an absolute trace, its [root](Self::trace);
/// all traces passed to the operations are relative to that root.
///
/// # Concurrency
///
/// Concurrent calls on instances derived from a common ancestor (through
/// [`resolve_descendant`](Self::resolve_descendant), or the same instance)
/// are only defined when they are *non-contradictory*. Two calls contradict
/// each other when they share a common-ancestor staging area and at least one
/// of them is not a `delete`. Deletes may race freely with each other and
/// with operations outside the deleted prefix. The caller (the interpreter,
/// by construction of the dependency graph) guarantees the rest.
#[async_trait]
pub trait StagingArea: Send + Sync + fmt::Debug {
    /// Absolute trace this staging area is scoped to.
    fn trace(&self) -> &ExecutionTrace;

    /// Remove every value whose trace starts with `prefix`.
    async fn delete(&self, prefix: &ExecutionTrace) -> Result<ExecutionTrace, StagingError>;

    /// Make `target` yield the value currently stored at `source`.
    ///
    /// Implementations avoid physical duplication where they can.
    async fn copy(
        &self,
        source: &ExecutionTrace,
        target: &ExecutionTrace,
    ) -> Result<ExecutionTrace, StagingError>;

    async fn put_object(
        &self,
        target: &ExecutionTrace,
        value: &Value,
    ) -> Result<ExecutionTrace, StagingError>;

    async fn put_serialization_tree(
        &self,
        target: &ExecutionTrace,
        tree: SerializationTree,
    ) -> Result<ExecutionTrace, StagingError>;

    async fn get_object(&self, source: &ExecutionTrace) -> Result<Value, StagingError>;

    async fn get_serialization_tree(
        &self,
        source: &ExecutionTrace,
    ) -> Result<SerializationTree, StagingError>;

    async fn exists(&self, source: &ExecutionTrace) -> Result<bool, StagingError>;

    /// Highest iteration index stored under the content trace `trace` that
    /// does not exceed `upper_bound`.
    async fn get_maximum_index(
        &self,
        trace: &ExecutionTrace,
        upper_bound: Option<Index>,
    ) -> Result<Option<Index>, StagingError>;

    /// A staging area scoped to the module or iteration at `trace`, sharing
    /// this one's backing store.
    fn resolve_descendant(
        &self,
        trace: &ExecutionTrace,
    ) -> Result<Arc<dyn StagingArea>, StagingError>;

    /// A provider able to reconstruct this staging area, possibly in another
    /// process.
    fn staging_area_provider(&self) -> Result<StagingAreaProvider, StagingError>;
}

// ---------------------------------------------------------------------------
// Precondition checks shared by the implementations
// ---------------------------------------------------------------------------

pub(crate) fn require_reference(
    operation: &str,
    trace: &ExecutionTrace,
) -> Result<(), StagingError> {
    if trace.has_empty_reference() {
        return Err(StagingError::IllegalArgument(format!(
            "{operation} expects a trace with a non-empty reference, got '{trace}'"
        )));
    }
    Ok(())
}

pub(crate) fn require_delete_prefix(prefix: &ExecutionTrace) -> Result<(), StagingError> {
    if prefix.frames().is_empty() && prefix.reference().is_empty() {
        return Err(StagingError::IllegalArgument(format!(
            "delete expects a prefix with frames or a reference, got '{prefix}'"
        )));
    }
    Ok(())
}

pub(crate) fn require_content(trace: &ExecutionTrace) -> Result<(), StagingError> {
    if !trace.has_empty_reference() || trace.element_type().ok() != Some(ElementType::Content) {
        return Err(StagingError::IllegalArgument(format!(
            "get_maximum_index expects a content trace without reference, got '{trace}'"
        )));
    }
    Ok(())
}

pub(crate) fn require_descendant(trace: &ExecutionTrace) -> Result<(), StagingError> {
    let frame = matches!(
        trace.element_type(),
        Ok(ElementType::Module) | Ok(ElementType::Iteration)
    );
    if !frame || !trace.has_empty_reference() {
        return Err(StagingError::IllegalArgument(format!(
            "resolve_descendant expects a module or iteration trace, got '{trace}'"
        )));
    }
    Ok(())
}

/// Only the root staging area and staging areas of simple modules can be
/// handed across a process boundary.
pub(crate) fn require_provider_root(
    trace: &ExecutionTrace,
    lookup: Option<&dyn ModuleLookup>,
) -> Result<(), StagingError> {
    if trace.is_empty() {
        return Ok(());
    }
    if trace.element_type()? != ElementType::Module {
        return Err(StagingError::Unsupported(format!(
            "no staging-area provider for '{trace}': not a module trace"
        )));
    }
    match lookup.and_then(|l| l.module_kind(trace)) {
        Some(ModuleKind::Simple) => Ok(()),
        Some(kind) => Err(StagingError::Unsupported(format!(
            "no staging-area provider for '{trace}': references a {kind} module"
        ))),
        None => Err(StagingError::IllegalState(format!(
            "no module information available for '{trace}'"
        ))),
    }
}
