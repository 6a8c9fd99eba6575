//! Serialization trees: the marshaled form of a stored value.
//!
//! A tree is either a byte leaf or an inner node whose children are keyed by
//! [`Key`]. Every node records the name of the marshaler that produced it so
//! the value can later be unmarshaled by the same marshaler. Values handed to
//! [`StagingArea::put_object`](crate::StagingArea::put_object) are marshaled
//! by the built-in `json` marshaler into a single leaf.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use trace::{ExecutionTrace, Key};

use crate::error::storage;
use crate::StagingError;

pub const JSON_MARSHALER: &str = "json";

/// A byte sequence that is either held in memory or read from a file on
/// demand, so large values need not be materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteSequence {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ByteSequence {
    pub fn read_all(&self) -> Result<Vec<u8>, StagingError> {
        match self {
            ByteSequence::Bytes(bytes) => Ok(bytes.clone()),
            ByteSequence::File(path) => fs::read(path).map_err(storage(path)),
        }
    }
}

impl From<Vec<u8>> for ByteSequence {
    fn from(bytes: Vec<u8>) -> Self {
        ByteSequence::Bytes(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializationTree {
    Leaf {
        marshaler: String,
        bytes: ByteSequence,
    },
    Node {
        marshaler: String,
        children: BTreeMap<Key, SerializationTree>,
    },
}

impl SerializationTree {
    pub fn leaf(marshaler: impl Into<String>, bytes: impl Into<ByteSequence>) -> Self {
        SerializationTree::Leaf {
            marshaler: marshaler.into(),
            bytes: bytes.into(),
        }
    }

    pub fn node(
        marshaler: impl Into<String>,
        children: impl IntoIterator<Item = (Key, SerializationTree)>,
    ) -> Self {
        SerializationTree::Node {
            marshaler: marshaler.into(),
            children: children.into_iter().collect(),
        }
    }

    pub fn marshaler(&self) -> &str {
        match self {
            SerializationTree::Leaf { marshaler, .. } | SerializationTree::Node { marshaler, .. } => {
                marshaler
            }
        }
    }

    /// Marshal a JSON value with the built-in `json` marshaler.
    pub fn marshal_json(value: &Value, trace: &ExecutionTrace) -> Result<Self, StagingError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StagingError::Marshal {
            trace: trace.clone(),
            message: e.to_string(),
        })?;
        Ok(Self::leaf(JSON_MARSHALER, bytes))
    }

    /// Unmarshal a tree produced by the `json` marshaler.
    pub fn unmarshal_json(&self, trace: &ExecutionTrace) -> Result<Value, StagingError> {
        match self {
            SerializationTree::Leaf { marshaler, bytes } if marshaler == JSON_MARSHALER => {
                serde_json::from_slice(&bytes.read_all()?).map_err(|e| StagingError::Marshal {
                    trace: trace.clone(),
                    message: e.to_string(),
                })
            }
            other => Err(StagingError::Marshal {
                trace: trace.clone(),
                message: format!(
                    "no unmarshaler for '{}' {}",
                    other.marshaler(),
                    if matches!(other, SerializationTree::Leaf { .. }) { "leaf" } else { "node" }
                ),
            }),
        }
    }

    /// Copy of the tree with every leaf read into memory.
    pub fn materialize(&self) -> Result<Self, StagingError> {
        Ok(match self {
            SerializationTree::Leaf { marshaler, bytes } => SerializationTree::Leaf {
                marshaler: marshaler.clone(),
                bytes: ByteSequence::Bytes(bytes.read_all()?),
            },
            SerializationTree::Node { marshaler, children } => SerializationTree::Node {
                marshaler: marshaler.clone(),
                children: children
                    .iter()
                    .map(|(key, child)| child.materialize().map(|tree| (key.clone(), tree)))
                    .collect::<Result<_, _>>()?,
            },
        })
    }
}
