//! Structural knowledge about the workflow a staging area belongs to.

use std::fmt;

use serde::{Deserialize, Serialize};
use trace::ExecutionTrace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Simple,
    Composite,
    Loop,
    Proxy,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Composite => write!(f, "composite"),
            Self::Loop => write!(f, "loop"),
            Self::Proxy => write!(f, "proxy"),
        }
    }
}

/// Resolves the frames of an absolute execution trace to the kind of module
/// they reference.
///
/// Staging areas consult it only to decide whether they may hand out a
/// [`StagingAreaProvider`](crate::StagingAreaProvider).
pub trait ModuleLookup: Send + Sync + fmt::Debug {
    fn module_kind(&self, trace: &ExecutionTrace) -> Option<ModuleKind>;
}
