//! File-system-backed staging area.
//!
//! Traces map element by element onto directories below a base path (see
//! [`layout`]). A value consists of its data (a file or a directory tree) and
//! a sidecar metadata file; the value exists exactly when the sidecar does.
//!
//! `copy` hard-links every file of the source, so duplicating a value costs
//! directory entries but no data, provided both paths live on the same file
//! store.
//!
//! Only the structural steps that race on the shared directory skeleton are
//! serialized: creating a value's parent directories together with its top
//! directory entry, and pruning empty ancestors after a delete. Reads and
//! data writes run unlocked.

mod fs_ops;
mod layout;
pub mod metadata;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tokio::runtime::Handle;
use tracing::{debug, instrument};
use trace::{ExecutionTrace, Index};

use crate::area::{
    require_content, require_delete_prefix, require_descendant, require_provider_root,
    require_reference,
};
use crate::error::storage;
use crate::lookup::ModuleLookup;
use crate::provider::{FileStagingAreaDescriptor, StagingAreaDescriptor, StagingAreaProvider};
use crate::tree::SerializationTree;
use crate::{StagingArea, StagingError};

use self::metadata::Metadata;

/// Prefix of the directories `copy` links a source into before it clears the
/// target. They live directly below the base path and never parse as a name.
const SNAPSHOT_PREFIX: &str = ".copy-";
const SNAPSHOT_DATA: &str = "data";
const SNAPSHOT_META: &str = "meta";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStagingAreaConfig {
    /// Directory corresponding to the empty execution trace. Never deleted.
    pub base_path: PathBuf,
    /// File-backed leaves below one of these paths are hard-linked into the
    /// store instead of copied.
    #[serde(default)]
    pub hard_link_eligible_paths: Vec<PathBuf>,
}

impl FileStagingAreaConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            hard_link_eligible_paths: Vec::new(),
        }
    }

    fn is_hard_link_eligible(&self, path: &Path) -> bool {
        self.hard_link_eligible_paths
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

// ---------------------------------------------------------------------------
// FileStagingArea
// ---------------------------------------------------------------------------

/// State shared by a root staging area and all of its descendants.
#[derive(Debug)]
struct Shared {
    config: FileStagingAreaConfig,
    tree_lock: Mutex<()>,
    executor: Handle,
}

impl Shared {
    /// Create the parent directories of `path` and then the entry itself via
    /// `create`, under the tree lock so that a concurrent pruning pass cannot
    /// remove the freshly created directories.
    fn create_locked<T>(
        &self,
        path: &Path,
        create: impl FnOnce() -> Result<T, StagingError>,
    ) -> Result<T, StagingError> {
        let _guard = self.tree_lock.lock();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(storage(parent))?;
        }
        create()
    }

    /// Delete empty directories from `start` upward, stopping at the first
    /// non-empty one and never touching the base path or anything outside it.
    fn prune(&self, start: &Path) -> Result<(), StagingError> {
        let base = &self.config.base_path;
        let _guard = self.tree_lock.lock();
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir == base.as_path() || !dir.starts_with(base) {
                break;
            }
            match fs_ops::is_empty_dir(dir) {
                Ok(true) => {
                    debug!("pruning empty directory {}", dir.display());
                    match fs::remove_dir(dir) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(storage(dir)(e)),
                    }
                }
                Ok(false) => break,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(storage(dir)(e)),
            }
            current = dir.parent();
        }
        Ok(())
    }

    /// Hard-link the value stored at `data` and `meta` into a fresh
    /// directory below the base path, removed again when dropped.
    fn snapshot(&self, data: &Path, meta: &Path) -> Result<TempDir, StagingError> {
        let base = self.config.base_path.as_path();
        let snapshot = tempfile::Builder::new()
            .prefix(SNAPSHOT_PREFIX)
            .tempdir_in(base)
            .map_err(storage(base))?;

        let staged = snapshot.path().join(SNAPSHOT_DATA);
        if fs::symlink_metadata(data).map_err(storage(data))?.is_dir() {
            fs::create_dir(&staged).map_err(storage(&staged))?;
            fs_ops::link_dir_contents(data, &staged)?;
        } else {
            fs_ops::link_or_copy(data, &staged)?;
        }
        fs_ops::link_or_copy(meta, &snapshot.path().join(SNAPSHOT_META))?;
        Ok(snapshot)
    }

    fn write_tree(&self, data: &Path, tree: &SerializationTree) -> Result<(), StagingError> {
        let eligible = |path: &Path| self.config.is_hard_link_eligible(path);
        let file = self.create_locked(data, || fs_ops::create_entry(data, tree, &eligible))?;
        fs_ops::fill_entry(data, tree, file, &eligible)
    }
}

/// Staging area storing values in a directory tree.
///
/// Construct the root with [`FileStagingArea::new`]; deeper instances come
/// from [`StagingArea::resolve_descendant`].
#[derive(Debug, Clone)]
pub struct FileStagingArea {
    shared: Arc<Shared>,
    trace: ExecutionTrace,
    lookup: Option<Arc<dyn ModuleLookup>>,
}

impl FileStagingArea {
    /// Root staging area (empty trace) at `config.base_path`. Blocking work
    /// is scheduled on `executor`.
    pub fn new(config: FileStagingAreaConfig, executor: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                tree_lock: Mutex::new(()),
                executor,
            }),
            trace: ExecutionTrace::empty(),
            lookup: None,
        }
    }

    pub fn with_module_lookup(mut self, lookup: Arc<dyn ModuleLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn config(&self) -> &FileStagingAreaConfig {
        &self.shared.config
    }

    pub(crate) fn scoped_to(&self, trace: ExecutionTrace) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            trace,
            lookup: self.lookup.clone(),
        }
    }

    fn absolute(&self, relative: &ExecutionTrace) -> Result<ExecutionTrace, StagingError> {
        Ok(self.trace.resolve(relative)?)
    }

    fn data_path(&self, absolute: &ExecutionTrace) -> PathBuf {
        layout::data_path(&self.shared.config.base_path, absolute)
    }

    /// Run `op` on the blocking pool.
    async fn run_blocking<T, F>(&self, operation: &'static str, op: F) -> Result<T, StagingError>
    where
        T: Send + 'static,
        F: FnOnce(&Shared) -> Result<T, StagingError> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.shared
            .executor
            .spawn_blocking(move || op(&shared))
            .await
            .map_err(|e| StagingError::Task {
                operation,
                message: e.to_string(),
            })?
    }

    async fn put_tree(
        &self,
        target: &ExecutionTrace,
        tree: SerializationTree,
    ) -> Result<ExecutionTrace, StagingError> {
        let absolute = self.absolute(target)?;
        let data = self.data_path(&absolute);
        let meta = layout::metadata_path(&data);

        self.run_blocking("put", move |shared| {
            // Retract the previous value (sidecar first), write data, commit.
            fs_ops::remove_file_if_exists(&meta)?;
            fs_ops::remove_tree(&data)?;
            shared.write_tree(&data, &tree)?;
            Metadata::new(&tree).write(&meta)
        })
        .await?;

        debug!("stored value at '{absolute}'");
        Ok(target.clone())
    }

    async fn read_tree(&self, source: &ExecutionTrace) -> Result<SerializationTree, StagingError> {
        let absolute = self.absolute(source)?;
        let data = self.data_path(&absolute);
        let meta = layout::metadata_path(&data);

        self.run_blocking("get", move |_| {
            let metadata = Metadata::read(&meta)?.ok_or(StagingError::NotFound(absolute))?;
            Ok(metadata.tree.to_tree(&data))
        })
        .await
    }
}

#[async_trait]
impl StagingArea for FileStagingArea {
    fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    #[instrument(level = "debug", skip_all, fields(prefix = %prefix))]
    async fn delete(&self, prefix: &ExecutionTrace) -> Result<ExecutionTrace, StagingError> {
        require_delete_prefix(prefix)?;
        let absolute = self.absolute(prefix)?;
        let data = self.data_path(&absolute);
        let meta = (!absolute.has_empty_reference()).then(|| layout::metadata_path(&data));

        self.run_blocking("delete", move |shared| {
            if let Some(meta) = &meta {
                fs_ops::remove_file_if_exists(meta)?;
            }
            fs_ops::remove_tree(&data)?;
            match data.parent() {
                Some(parent) => shared.prune(parent),
                None => Ok(()),
            }
        })
        .await?;

        Ok(prefix.clone())
    }

    #[instrument(level = "debug", skip_all, fields(source = %source, target = %target))]
    async fn copy(
        &self,
        source: &ExecutionTrace,
        target: &ExecutionTrace,
    ) -> Result<ExecutionTrace, StagingError> {
        require_reference("copy", source)?;
        require_reference("copy", target)?;
        let source_abs = self.absolute(source)?;
        let target_abs = self.absolute(target)?;
        let source_data = self.data_path(&source_abs);
        let source_meta = layout::metadata_path(&source_data);
        let target_data = self.data_path(&target_abs);
        let target_meta = layout::metadata_path(&target_data);

        self.run_blocking("copy", move |shared| {
            if !fs_ops::file_exists(&source_meta)? {
                return Err(StagingError::NotFound(source_abs));
            }
            if source_abs == target_abs {
                return Ok(());
            }

            // The target may contain the source or lie below it: link the
            // source aside before the target is cleared.
            let snapshot = shared.snapshot(&source_data, &source_meta)?;
            let staged_data = snapshot.path().join(SNAPSHOT_DATA);
            let staged_meta = snapshot.path().join(SNAPSHOT_META);

            fs_ops::remove_file_if_exists(&target_meta)?;
            fs_ops::remove_tree(&target_data)?;
            shared.create_locked(&target_data, || {
                fs::rename(&staged_data, &target_data).map_err(storage(&target_data))
            })?;
            fs::rename(&staged_meta, &target_meta).map_err(storage(&target_meta))
        })
        .await?;

        Ok(target.clone())
    }

    #[instrument(level = "debug", skip_all, fields(target = %target))]
    async fn put_object(
        &self,
        target: &ExecutionTrace,
        value: &Value,
    ) -> Result<ExecutionTrace, StagingError> {
        require_reference("put_object", target)?;
        let tree = SerializationTree::marshal_json(value, target)?;
        self.put_tree(target, tree).await
    }

    #[instrument(level = "debug", skip_all, fields(target = %target))]
    async fn put_serialization_tree(
        &self,
        target: &ExecutionTrace,
        tree: SerializationTree,
    ) -> Result<ExecutionTrace, StagingError> {
        require_reference("put_serialization_tree", target)?;
        self.put_tree(target, tree).await
    }

    #[instrument(level = "debug", skip_all, fields(source = %source))]
    async fn get_object(&self, source: &ExecutionTrace) -> Result<Value, StagingError> {
        require_reference("get_object", source)?;
        let absolute = self.absolute(source)?;
        let data = self.data_path(&absolute);
        let meta = layout::metadata_path(&data);

        self.run_blocking("get_object", move |_| {
            let metadata =
                Metadata::read(&meta)?.ok_or_else(|| StagingError::NotFound(absolute.clone()))?;
            metadata.tree.to_tree(&data).unmarshal_json(&absolute)
        })
        .await
    }

    async fn get_serialization_tree(
        &self,
        source: &ExecutionTrace,
    ) -> Result<SerializationTree, StagingError> {
        require_reference("get_serialization_tree", source)?;
        self.read_tree(source).await
    }

    async fn exists(&self, source: &ExecutionTrace) -> Result<bool, StagingError> {
        require_reference("exists", source)?;
        let absolute = self.absolute(source)?;
        let meta = layout::metadata_path(&self.data_path(&absolute));
        self.run_blocking("exists", move |_| fs_ops::file_exists(&meta))
            .await
    }

    #[instrument(level = "debug", skip_all, fields(trace = %trace))]
    async fn get_maximum_index(
        &self,
        trace: &ExecutionTrace,
        upper_bound: Option<Index>,
    ) -> Result<Option<Index>, StagingError> {
        require_content(trace)?;
        let absolute = self.absolute(trace)?;
        let dir = self.data_path(&absolute);

        self.run_blocking("get_maximum_index", move |_| {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(storage(&dir)(e)),
            };

            let mut maximum: Option<Index> = None;
            for entry in entries {
                let entry = entry.map_err(storage(&dir))?;
                let Some(index) = entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<Index>().ok())
                else {
                    continue;
                };
                if let Some(bound) = upper_bound {
                    if index == bound {
                        return Ok(Some(index));
                    }
                    if index > bound {
                        continue;
                    }
                }
                maximum = maximum.max(Some(index));
            }
            Ok(maximum)
        })
        .await
    }

    fn resolve_descendant(
        &self,
        trace: &ExecutionTrace,
    ) -> Result<Arc<dyn StagingArea>, StagingError> {
        require_descendant(trace)?;
        Ok(Arc::new(self.scoped_to(self.absolute(trace)?)))
    }

    fn staging_area_provider(&self) -> Result<StagingAreaProvider, StagingError> {
        require_provider_root(&self.trace, self.lookup.as_deref())?;
        let config = &self.shared.config;
        Ok(StagingAreaProvider::Descriptor(StagingAreaDescriptor::File(
            FileStagingAreaDescriptor {
                base_path: config.base_path.clone(),
                trace: self.trace.clone(),
                hard_link_eligible_paths: config.hard_link_eligible_paths.clone(),
            },
        )))
    }
}
