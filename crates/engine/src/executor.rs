//! Local workflow interpreter.
//!
//! `Interpreter` drives a [`StagingArea`] the way a workflow engine does:
//! 1. Validates the workflow and stages its inputs at `<workflow>:in:<port>`.
//! 2. Walks the module tree. Simple modules read their in-ports, run through
//!    their registered [`SimpleModule`] and write their out-ports; composites
//!    run children in topological order, wiring values with `copy`; loops run
//!    their body once per iteration; proxies run their target in place.
//! 3. Handles `ModuleError::Retryable` (up to `max_retries`, exponential
//!    back-off) and `ModuleError::Fatal` (abort immediately).
//! 4. Optionally deletes intermediate values once a composite or loop is done.
//!
//! A value that is missing at the source of a connection leaves the target
//! port empty; a module's out-ports that it does not produce are cleared.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, debug_span, info, instrument, warn, Instrument};
use uuid::Uuid;

use modules::{ExecutionContext, ModuleError, ModuleRegistry, PortValues, SimpleModule};
use staging::StagingArea;
use trace::{ExecutionTrace, Index, Name};

use crate::dag::{validate, validate_dag};
use crate::models::{Connection, Endpoint, Module, ModuleBody};
use crate::EngineError;

/// Out-port a loop body sets to `true` to request another iteration.
pub const CONTINUE_PORT: &str = "continue";

/// Ceiling on the back-off between two attempts of a module.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Maximum number of times a retryable module failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Keep the values of children and iterations after their parent is done.
    pub retain_intermediates: bool,
    /// Upper limit on the number of iterations of any loop.
    pub max_iterations: u32,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            retain_intermediates: true,
            max_iterations: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Output of a completed execution
// ---------------------------------------------------------------------------

/// The result of running a full workflow.
#[derive(Debug)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    /// Absolute trace the workflow was staged at.
    pub trace: ExecutionTrace,
    /// Values of the workflow's out-ports that were produced.
    pub outputs: PortValues,
}

// ---------------------------------------------------------------------------
// Trace helpers
// ---------------------------------------------------------------------------

fn name(port: &str) -> Result<Name, EngineError> {
    Ok(Name::new(port)?)
}

fn in_port(port: &str) -> Result<ExecutionTrace, EngineError> {
    Ok(ExecutionTrace::empty().resolve_in_port(name(port)?)?)
}

fn out_port(port: &str) -> Result<ExecutionTrace, EngineError> {
    Ok(ExecutionTrace::empty().resolve_out_port(name(port)?)?)
}

/// `/<child>`
fn child_frame(child: &str) -> Result<ExecutionTrace, EngineError> {
    Ok(ExecutionTrace::empty()
        .resolve_content()?
        .resolve_module(name(child)?)?)
}

/// `/<iteration>`
fn iteration_frame(iteration: u32) -> Result<ExecutionTrace, EngineError> {
    Ok(ExecutionTrace::empty()
        .resolve_content()?
        .resolve_iteration(Index::new(iteration))?)
}

/// Where the value of a connection comes from, relative to the composite.
fn connection_source(endpoint: &Endpoint) -> Result<ExecutionTrace, EngineError> {
    match &endpoint.module {
        None => in_port(&endpoint.port),
        Some(child) => Ok(child_frame(child)?.resolve_out_port(name(&endpoint.port)?)?),
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Runs workflows against a staging area.
///
/// Stateless apart from its registry and configuration; one interpreter can
/// serve any number of concurrent runs as long as they use disjoint traces.
pub struct Interpreter {
    registry: ModuleRegistry,
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new(registry: ModuleRegistry, config: InterpreterConfig) -> Self {
        Self { registry, config }
    }

    /// Stage `inputs`, run `workflow` below `root`, and return its outputs.
    ///
    /// The workflow is staged at the trace named after it; re-running a
    /// workflow over the same staging area resumes its loops after the last
    /// iteration that was started.
    ///
    /// # Errors
    /// Returns `EngineError` for validation failures, unknown inputs or
    /// module types, fatal module errors, retry exhaustion, or staging
    /// problems.
    #[instrument(skip(self, workflow, root, inputs), fields(workflow = %workflow.name))]
    pub async fn execute(
        &self,
        workflow: &Module,
        root: Arc<dyn StagingArea>,
        inputs: PortValues,
    ) -> Result<ExecutionResult, EngineError> {
        validate(workflow)?;
        let frame = ExecutionTrace::empty().resolve_module(name(&workflow.name)?)?;
        let area = root.resolve_descendant(&frame)?;

        for (port, value) in &inputs {
            if !workflow.in_ports.contains(port) {
                return Err(EngineError::UnknownPort {
                    module: workflow.name.clone(),
                    port: port.clone(),
                    side: "input",
                });
            }
            area.put_object(&in_port(port)?, value).await?;
        }

        let execution_id = Uuid::new_v4();
        self.run_module(workflow, Arc::clone(&area), execution_id)
            .await?;

        let mut outputs = PortValues::new();
        for port in &workflow.out_ports {
            let trace = out_port(port)?;
            if area.exists(&trace).await? {
                outputs.insert(port.clone(), area.get_object(&trace).await?);
            }
        }

        info!(
            "workflow '{}' execution {} succeeded with {} outputs",
            workflow.name,
            execution_id,
            outputs.len()
        );

        Ok(ExecutionResult {
            execution_id,
            trace: area.trace().clone(),
            outputs,
        })
    }

    /// Run `module` in `area`, which must already hold its inputs.
    pub async fn run(
        &self,
        module: &Module,
        area: Arc<dyn StagingArea>,
    ) -> Result<Uuid, EngineError> {
        validate(module)?;
        let execution_id = Uuid::new_v4();
        self.run_module(module, area, execution_id).await?;
        Ok(execution_id)
    }

    fn run_module<'a>(
        &'a self,
        module: &'a Module,
        area: Arc<dyn StagingArea>,
        execution_id: Uuid,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        let span = debug_span!("module", trace = %area.trace(), kind = %module.kind());
        async move {
            match &module.body {
                ModuleBody::Simple { module_type } => {
                    self.run_simple(module, module_type, area.as_ref(), execution_id)
                        .await
                }
                ModuleBody::Composite { connections, .. } => {
                    self.run_composite(module, connections, area, execution_id)
                        .await
                }
                ModuleBody::Loop { body } => self.run_loop(module, body, area, execution_id).await,
                ModuleBody::Proxy { target } => self.run_module(target, area, execution_id).await,
            }
        }
        .instrument(span)
        .boxed()
    }

    // -----------------------------------------------------------------------
    // Simple modules
    // -----------------------------------------------------------------------

    async fn run_simple(
        &self,
        module: &Module,
        module_type: &str,
        area: &dyn StagingArea,
        execution_id: Uuid,
    ) -> Result<(), EngineError> {
        let implementation =
            self.registry
                .get(module_type)
                .ok_or_else(|| EngineError::UnknownModuleType {
                    trace: area.trace().clone(),
                    module_type: module_type.to_owned(),
                })?;

        let mut inputs = PortValues::new();
        for port in &module.in_ports {
            let trace = in_port(port)?;
            if area.exists(&trace).await? {
                inputs.insert(port.clone(), area.get_object(&trace).await?);
            }
        }

        let ctx = ExecutionContext {
            execution_id,
            trace: area.trace().clone(),
        };
        let mut outputs = self
            .execute_with_retry(implementation.as_ref(), inputs, &ctx)
            .await?;

        for port in &module.out_ports {
            let trace = out_port(port)?;
            match outputs.remove(port) {
                Some(value) => {
                    area.put_object(&trace, &value).await?;
                }
                None => {
                    area.delete(&trace).await?;
                }
            }
        }
        for port in outputs.keys() {
            warn!("module at '{}' produced undeclared output '{port}'", ctx.trace);
        }

        debug!("module at '{}' succeeded", ctx.trace);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Composite modules
    // -----------------------------------------------------------------------

    async fn run_composite(
        &self,
        module: &Module,
        connections: &[Connection],
        area: Arc<dyn StagingArea>,
        execution_id: Uuid,
    ) -> Result<(), EngineError> {
        let order = validate_dag(module)?;
        debug!(
            "running {} children of '{}' in order: {:?}",
            order.len(),
            area.trace(),
            order.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );

        for child in &order {
            let frame = child_frame(&child.name)?;
            let feeding = connections
                .iter()
                .filter(|c| c.to.module.as_deref() == Some(child.name.as_str()));
            for connection in feeding {
                let target = frame.resolve_in_port(name(&connection.to.port)?)?;
                let source = connection_source(&connection.from)?;
                forward(area.as_ref(), Some(&source), &target).await?;
            }

            let child_area = area.resolve_descendant(&frame)?;
            self.run_module(child, child_area, execution_id).await?;
        }

        for connection in connections.iter().filter(|c| c.to.module.is_none()) {
            let source = connection_source(&connection.from)?;
            forward(area.as_ref(), Some(&source), &out_port(&connection.to.port)?).await?;
        }

        if !self.config.retain_intermediates {
            let frames = order
                .iter()
                .map(|child| child_frame(&child.name))
                .collect::<Result<Vec<_>, _>>()?;
            discard(area.as_ref(), &frames).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Loops
    // -----------------------------------------------------------------------

    async fn run_loop(
        &self,
        module: &Module,
        body: &Module,
        area: Arc<dyn StagingArea>,
        execution_id: Uuid,
    ) -> Result<(), EngineError> {
        let content = ExecutionTrace::empty().resolve_content()?;
        let first = area
            .get_maximum_index(&content, None)
            .await?
            .map_or(0, Index::value);
        if first > 0 {
            info!("resuming loop '{}' at iteration {first}", area.trace());
        }

        let mut iteration = first;
        loop {
            let frame = iteration_frame(iteration)?;
            for port in &body.in_ports {
                let source = self
                    .iteration_input(module, area.as_ref(), iteration, port)
                    .await?;
                let target = frame.resolve_in_port(name(port)?)?;
                forward(area.as_ref(), source.as_ref(), &target).await?;
            }

            let body_area = area.resolve_descendant(&frame)?;
            self.run_module(body, body_area, execution_id).await?;

            let proceed = frame.resolve_out_port(name(CONTINUE_PORT)?)?;
            let again = area.exists(&proceed).await?
                && area.get_object(&proceed).await?.as_bool().unwrap_or(false);
            if !again {
                break;
            }
            if iteration + 1 >= self.config.max_iterations {
                warn!(
                    "loop '{}' stopped after reaching the limit of {} iterations",
                    area.trace(),
                    self.config.max_iterations
                );
                break;
            }
            iteration += 1;
        }

        let last = iteration_frame(iteration)?;
        for port in &module.out_ports {
            let source = last.resolve_out_port(name(port)?)?;
            forward(area.as_ref(), Some(&source), &out_port(port)?).await?;
        }
        debug!("loop '{}' finished after iteration {iteration}", area.trace());

        if !self.config.retain_intermediates {
            let frames = (0..=iteration)
                .map(iteration_frame)
                .collect::<Result<Vec<_>, _>>()?;
            discard(area.as_ref(), &frames).await?;
        }
        Ok(())
    }

    /// Source of in-port `port` of iteration `iteration`: the previous
    /// iteration's out-port of the same name if it has a value, otherwise
    /// the loop's own in-port.
    async fn iteration_input(
        &self,
        module: &Module,
        area: &dyn StagingArea,
        iteration: u32,
        port: &str,
    ) -> Result<Option<ExecutionTrace>, EngineError> {
        if iteration > 0 {
            let previous = iteration_frame(iteration - 1)?.resolve_out_port(name(port)?)?;
            if area.exists(&previous).await? {
                return Ok(Some(previous));
            }
        }
        if module.in_ports.iter().any(|p| p == port) {
            return Ok(Some(in_port(port)?));
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Internal: execute a single module with retry logic.
    // -----------------------------------------------------------------------

    async fn execute_with_retry(
        &self,
        module: &dyn SimpleModule,
        inputs: PortValues,
        ctx: &ExecutionContext,
    ) -> Result<PortValues, EngineError> {
        let mut attempts = 0u32;

        loop {
            match module.execute(inputs.clone(), ctx).await {
                Ok(outputs) => return Ok(outputs),

                Err(ModuleError::Fatal(msg)) => {
                    return Err(EngineError::ModuleFatal {
                        trace: ctx.trace.clone(),
                        message: msg,
                    });
                }

                Err(ModuleError::Retryable(msg)) => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(EngineError::ModuleRetryExhausted {
                            trace: ctx.trace.clone(),
                            message: msg,
                        });
                    }

                    let delay = retry_delay(self.config.retry_base_delay, attempts);

                    warn!(
                        "module at '{}' retryable error (attempt {}/{}), retrying in {:?}: {}",
                        ctx.trace, attempts, self.config.max_retries, delay, msg
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Exponential back-off before retry number `attempt` (1-based), capped at
/// [`MAX_RETRY_DELAY`].
pub(crate) fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Make `target` hold the value at `source`, or nothing if there is none.
async fn forward(
    area: &dyn StagingArea,
    source: Option<&ExecutionTrace>,
    target: &ExecutionTrace,
) -> Result<(), EngineError> {
    match source {
        Some(source) if area.exists(source).await? => {
            area.copy(source, target).await?;
        }
        _ => {
            area.delete(target).await?;
        }
    }
    Ok(())
}

/// Delete the values below every frame concurrently.
async fn discard(area: &dyn StagingArea, frames: &[ExecutionTrace]) -> Result<(), EngineError> {
    futures::future::try_join_all(frames.iter().map(|frame| area.delete(frame))).await?;
    debug!("discarded {} intermediate frames below '{}'", frames.len(), area.trace());
    Ok(())
}

/// Convenience for callers holding plain JSON inputs.
pub fn port_values<I, K>(values: I) -> PortValues
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    values.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
