//! Built-in modules available to every workflow.
//!
//! | type        | in-ports        | out-ports                      |
//! |-------------|-----------------|--------------------------------|
//! | `identity`  | any             | same names, same values        |
//! | `sum`       | any (numbers or arrays of numbers) | `sum`       |
//! | `countdown` | `n`             | `n` (= n - 1), `continue`      |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{ExecutionContext, ModuleError, ModuleRegistry, PortValues, SimpleModule};

/// Registry holding every built-in module.
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.insert("identity".into(), Arc::new(Identity) as Arc<dyn SimpleModule>);
    registry.insert("sum".into(), Arc::new(Sum));
    registry.insert("countdown".into(), Arc::new(Countdown));
    registry
}

/// Forwards every input to the out-port of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl SimpleModule for Identity {
    async fn execute(
        &self,
        inputs: PortValues,
        _ctx: &ExecutionContext,
    ) -> Result<PortValues, ModuleError> {
        Ok(inputs)
    }
}

/// Adds up all inputs, flattening arrays one level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

fn as_number(port: &str, value: &Value) -> Result<f64, ModuleError> {
    value
        .as_f64()
        .ok_or_else(|| ModuleError::Fatal(format!("input '{port}' is not a number: {value}")))
}

#[async_trait]
impl SimpleModule for Sum {
    async fn execute(
        &self,
        inputs: PortValues,
        ctx: &ExecutionContext,
    ) -> Result<PortValues, ModuleError> {
        // Integers add up exactly until one is not an `i64` or the sum
        // overflows; from then on only the float total counts.
        let mut float_total = 0.0;
        let mut int_total = Some(0i64);
        for (port, value) in &inputs {
            let items = match value {
                Value::Array(items) => items.as_slice(),
                other => std::slice::from_ref(other),
            };
            for item in items {
                float_total += as_number(port, item)?;
                int_total = int_total.and_then(|sum| sum.checked_add(item.as_i64()?));
            }
        }

        let sum = match int_total {
            Some(total) => json!(total),
            None => json!(float_total),
        };
        debug!("sum at '{}' = {sum}", ctx.trace);
        Ok(PortValues::from([("sum".to_owned(), sum)]))
    }
}

/// Loop-body helper: decrements `n` and asks for another iteration while the
/// result is positive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Countdown;

#[async_trait]
impl SimpleModule for Countdown {
    async fn execute(
        &self,
        inputs: PortValues,
        _ctx: &ExecutionContext,
    ) -> Result<PortValues, ModuleError> {
        let n = inputs
            .get("n")
            .and_then(Value::as_i64)
            .ok_or_else(|| ModuleError::Fatal("countdown expects an integer input 'n'".into()))?;
        let next = n - 1;
        Ok(PortValues::from([
            ("n".to_owned(), json!(next)),
            ("continue".to_owned(), json!(next > 0)),
        ]))
    }
}
