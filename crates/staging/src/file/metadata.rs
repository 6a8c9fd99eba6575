//! Sidecar metadata files.
//!
//! The sidecar records the shape of the stored serialization tree (marshaler
//! names and child keys). Its presence is what makes a value exist.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trace::Key;

use crate::error::storage;
use crate::file::layout::key_segment;
use crate::tree::{ByteSequence, SerializationTree};
use crate::StagingError;

pub(crate) const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub tree: TreeManifest,
}

/// A serialization tree without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeManifest {
    Leaf {
        marshaler: String,
    },
    Node {
        marshaler: String,
        children: Vec<ManifestEntry>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: Key,
    pub tree: TreeManifest,
}

impl TreeManifest {
    pub fn of(tree: &SerializationTree) -> Self {
        match tree {
            SerializationTree::Leaf { marshaler, .. } => TreeManifest::Leaf {
                marshaler: marshaler.clone(),
            },
            SerializationTree::Node { marshaler, children } => TreeManifest::Node {
                marshaler: marshaler.clone(),
                children: children
                    .iter()
                    .map(|(key, child)| ManifestEntry {
                        key: key.clone(),
                        tree: TreeManifest::of(child),
                    })
                    .collect(),
            },
        }
    }

    /// Rebuild the tree stored at `data_path`, with leaves read lazily.
    pub(crate) fn to_tree(&self, data_path: &Path) -> SerializationTree {
        match self {
            TreeManifest::Leaf { marshaler } => SerializationTree::Leaf {
                marshaler: marshaler.clone(),
                bytes: ByteSequence::File(data_path.to_path_buf()),
            },
            TreeManifest::Node { marshaler, children } => SerializationTree::Node {
                marshaler: marshaler.clone(),
                children: children
                    .iter()
                    .map(|entry| {
                        let child_path = data_path.join(key_segment(&entry.key));
                        (entry.key.clone(), entry.tree.to_tree(&child_path))
                    })
                    .collect::<BTreeMap<_, _>>(),
            },
        }
    }
}

impl Metadata {
    pub fn new(tree: &SerializationTree) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            tree: TreeManifest::of(tree),
        }
    }

    /// `None` if the sidecar does not exist.
    pub(crate) fn read(path: &Path) -> Result<Option<Self>, StagingError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if super::fs_ops::is_absent(&e) => return Ok(None),
            Err(e) => return Err(storage(path)(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StagingError::Metadata {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write through a temporary file and rename, so a reader never sees a
    /// partially written sidecar.
    pub(crate) fn write(&self, path: &Path) -> Result<(), StagingError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| StagingError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        let temp = temp_path(path);
        fs::write(&temp, bytes).map_err(storage(&temp))?;
        fs::rename(&temp, path).map_err(storage(path))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
