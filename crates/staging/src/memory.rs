//! In-memory staging area, for tests and single-process runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use trace::{Element, ExecutionTrace, Index};

use crate::area::{
    require_content, require_delete_prefix, require_descendant, require_provider_root,
    require_reference,
};
use crate::lookup::ModuleLookup;
use crate::provider::StagingAreaProvider;
use crate::tree::SerializationTree;
use crate::{StagingArea, StagingError};

type Store = BTreeMap<ExecutionTrace, SerializationTree>;

/// Values keyed by absolute trace in an ordered map.
///
/// Since a trace sorts directly before all of its extensions, every prefix
/// query is a contiguous range scan. Stored trees are fully materialized, so
/// later changes to files they were built from are not observed.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStagingArea {
    store: Arc<Mutex<Store>>,
    trace: ExecutionTrace,
    lookup: Option<Arc<dyn ModuleLookup>>,
}

impl InMemoryStagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module_lookup(mut self, lookup: Arc<dyn ModuleLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Number of values stored across the whole tree.
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    fn absolute(&self, relative: &ExecutionTrace) -> Result<ExecutionTrace, StagingError> {
        Ok(self.trace.resolve(relative)?)
    }

    fn insert(&self, absolute: ExecutionTrace, tree: SerializationTree) {
        let mut store = self.store.lock();
        remove_prefixed(&mut store, &absolute);
        store.insert(absolute, tree);
    }
}

fn remove_prefixed(store: &mut Store, prefix: &ExecutionTrace) {
    let doomed: Vec<ExecutionTrace> = store
        .range(prefix.clone()..)
        .map(|(trace, _)| trace)
        .take_while(|trace| trace.starts_with(prefix))
        .cloned()
        .collect();
    for trace in doomed {
        store.remove(&trace);
    }
}

#[async_trait]
impl StagingArea for InMemoryStagingArea {
    fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    async fn delete(&self, prefix: &ExecutionTrace) -> Result<ExecutionTrace, StagingError> {
        require_delete_prefix(prefix)?;
        let absolute = self.absolute(prefix)?;
        remove_prefixed(&mut self.store.lock(), &absolute);
        Ok(prefix.clone())
    }

    async fn copy(
        &self,
        source: &ExecutionTrace,
        target: &ExecutionTrace,
    ) -> Result<ExecutionTrace, StagingError> {
        require_reference("copy", source)?;
        require_reference("copy", target)?;
        let source_abs = self.absolute(source)?;
        let target_abs = self.absolute(target)?;

        let mut store = self.store.lock();
        if !store.contains_key(&source_abs) {
            return Err(StagingError::NotFound(source_abs));
        }
        // Rebase the source and everything stored below it onto the target.
        let mut copied = Vec::new();
        for (stored, tree) in store
            .range(source_abs.clone()..)
            .take_while(|(stored, _)| stored.starts_with(&source_abs))
        {
            let Some(rest) = stored.strip_prefix(&source_abs) else {
                continue;
            };
            copied.push((target_abs.resolve(&rest)?, tree.clone()));
        }
        remove_prefixed(&mut store, &target_abs);
        store.extend(copied);
        Ok(target.clone())
    }

    async fn put_object(
        &self,
        target: &ExecutionTrace,
        value: &Value,
    ) -> Result<ExecutionTrace, StagingError> {
        require_reference("put_object", target)?;
        let absolute = self.absolute(target)?;
        let tree = SerializationTree::marshal_json(value, &absolute)?;
        self.insert(absolute, tree);
        Ok(target.clone())
    }

    async fn put_serialization_tree(
        &self,
        target: &ExecutionTrace,
        tree: SerializationTree,
    ) -> Result<ExecutionTrace, StagingError> {
        require_reference("put_serialization_tree", target)?;
        let absolute = self.absolute(target)?;
        let tree = tree.materialize()?;
        self.insert(absolute, tree);
        Ok(target.clone())
    }

    async fn get_object(&self, source: &ExecutionTrace) -> Result<Value, StagingError> {
        let absolute = self.absolute(source)?;
        self.get_serialization_tree(source)
            .await?
            .unmarshal_json(&absolute)
    }

    async fn get_serialization_tree(
        &self,
        source: &ExecutionTrace,
    ) -> Result<SerializationTree, StagingError> {
        require_reference("get_serialization_tree", source)?;
        let absolute = self.absolute(source)?;
        let store = self.store.lock();
        store
            .get(&absolute)
            .cloned()
            .ok_or(StagingError::NotFound(absolute))
    }

    async fn exists(&self, source: &ExecutionTrace) -> Result<bool, StagingError> {
        require_reference("exists", source)?;
        let absolute = self.absolute(source)?;
        Ok(self.store.lock().contains_key(&absolute))
    }

    async fn get_maximum_index(
        &self,
        trace: &ExecutionTrace,
        upper_bound: Option<Index>,
    ) -> Result<Option<Index>, StagingError> {
        require_content(trace)?;
        let absolute = self.absolute(trace)?;
        let depth = absolute.len();

        let store = self.store.lock();
        let maximum = store
            .range(absolute.clone()..)
            .map(|(stored, _)| stored)
            .take_while(|stored| stored.starts_with(&absolute))
            .filter_map(|stored| match stored.elements().get(depth) {
                Some(Element::Iteration(index)) => Some(*index),
                _ => None,
            })
            .filter(|index| upper_bound.map_or(true, |bound| *index <= bound))
            .max();
        Ok(maximum)
    }

    fn resolve_descendant(
        &self,
        trace: &ExecutionTrace,
    ) -> Result<Arc<dyn StagingArea>, StagingError> {
        require_descendant(trace)?;
        Ok(Arc::new(Self {
            store: Arc::clone(&self.store),
            trace: self.absolute(trace)?,
            lookup: self.lookup.clone(),
        }))
    }

    /// In-memory staging areas only exist within this process, so the
    /// provider is always a live handle.
    fn staging_area_provider(&self) -> Result<StagingAreaProvider, StagingError> {
        require_provider_root(&self.trace, self.lookup.as_deref())?;
        Ok(StagingAreaProvider::Live(Arc::new(self.clone())))
    }
}
