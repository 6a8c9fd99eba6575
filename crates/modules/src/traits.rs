//! The `SimpleModule` trait, the contract every leaf module must fulfil.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use trace::ExecutionTrace;
use uuid::Uuid;

use crate::ModuleError;

/// Values keyed by port name.
pub type PortValues = BTreeMap<String, Value>;

/// Maps module type strings to implementations.
pub type ModuleRegistry = HashMap<String, Arc<dyn SimpleModule>>;

/// Shared context passed to every module during execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the current run.
    pub execution_id: Uuid,
    /// Absolute trace of the module being executed.
    pub trace: ExecutionTrace,
}

/// The core leaf-module trait.
#[async_trait]
pub trait SimpleModule: Send + Sync {
    /// Execute the module on the values of its connected in-ports and return
    /// the values of its out-ports. Out-ports missing from the result stay
    /// empty.
    async fn execute(
        &self,
        inputs: PortValues,
        ctx: &ExecutionContext,
    ) -> Result<PortValues, ModuleError>;
}
