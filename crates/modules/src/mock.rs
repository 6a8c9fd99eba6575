//! `MockModule`: a test double for `SimpleModule`.
//!
//! Useful in interpreter tests where a real module implementation is either
//! unavailable or irrelevant.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{ExecutionContext, ModuleError, PortValues, SimpleModule};

/// Behaviour injected into `MockModule` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return the given out-port values.
    Return(PortValues),
    /// Fail with a `Retryable` error on the first `failures` calls, then
    /// return the given values.
    Flaky { failures: usize, outputs: PortValues },
    /// Always fail with a `Retryable` error.
    FailRetryable(String),
    /// Always fail with a `Fatal` error.
    FailFatal(String),
}

/// A mock module that records every call it receives and returns a
/// programmer-specified result.
#[derive(Debug, Clone)]
pub struct MockModule {
    /// Label used in test assertions and error messages.
    pub name: String,
    pub behaviour: MockBehaviour,
    /// All inputs seen by this module (in call order).
    pub calls: Arc<Mutex<Vec<PortValues>>>,
}

impl MockModule {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that always succeeds with the given out-port values.
    pub fn returning<I, K>(name: impl Into<String>, outputs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let outputs = outputs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::with_behaviour(name, MockBehaviour::Return(outputs))
    }

    /// A mock that fails `failures` times with a retryable error before
    /// succeeding with `outputs`.
    pub fn flaky<I, K>(name: impl Into<String>, failures: usize, outputs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let outputs = outputs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::with_behaviour(name, MockBehaviour::Flaky { failures, outputs })
    }

    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailFatal(msg.into()))
    }

    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Number of times this module has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Inputs of the most recent call.
    pub fn last_inputs(&self) -> Option<PortValues> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl SimpleModule for MockModule {
    async fn execute(
        &self,
        inputs: PortValues,
        _ctx: &ExecutionContext,
    ) -> Result<PortValues, ModuleError> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(inputs);
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::Return(outputs) => Ok(outputs.clone()),
            MockBehaviour::Flaky { failures, outputs } => {
                if call <= *failures {
                    Err(ModuleError::Retryable(format!(
                        "{} failing on call {call}",
                        self.name
                    )))
                } else {
                    Ok(outputs.clone())
                }
            }
            MockBehaviour::FailRetryable(msg) => Err(ModuleError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(ModuleError::Fatal(msg.clone())),
        }
    }
}
