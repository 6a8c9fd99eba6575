//! `stagehand` CLI entry-point.
//!
//! Available sub-commands:
//! - `trace`   : parse an execution trace and show its structure.
//! - `stage`   : operate on a file staging area (`put`, `get`, `exists`,
//!   `copy`, `delete`, `max-index`).
//! - `validate`: validate a workflow JSON file.
//! - `run`     : run a workflow JSON file against a file staging area.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{Interpreter, InterpreterConfig, Module};
use staging::{ErrorReport, FileStagingArea, FileStagingAreaConfig, StagingArea};
use trace::{grammar, ExecutionTrace, Index};

#[derive(Parser)]
#[command(
    name = "stagehand",
    about = "Execution traces, staging areas and a local workflow interpreter",
    version
)]
struct Cli {
    /// Print failures as a structured JSON error report.
    #[arg(long, global = true)]
    json_errors: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse an execution trace and print its decomposition.
    Trace {
        /// Trace in canonical syntax, e.g. `loop/3/sum:in:num`.
        trace: String,
    },
    /// Operate on a file staging area.
    Stage {
        /// Base directory of the staging area.
        #[arg(long, env = "STAGEHAND_BASE")]
        base: PathBuf,
        /// Paths whose files may be hard-linked into the store.
        #[arg(long = "hard-link-eligible")]
        hard_link_eligible: Vec<PathBuf>,
        #[command(subcommand)]
        op: StageOp,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow definition JSON file.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Base directory of the staging area.
        #[arg(long, env = "STAGEHAND_BASE")]
        base: PathBuf,
        /// Workflow input as `port=<json>`; repeatable.
        #[arg(long = "input", value_parser = parse_input)]
        inputs: Vec<(String, Value)>,
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
        #[arg(long, default_value_t = 100)]
        retry_base_delay_ms: u64,
        #[arg(long, default_value_t = 1000)]
        max_iterations: u32,
        /// Delete the values of children and iterations once their parent is done.
        #[arg(long)]
        discard_intermediates: bool,
    },
}

#[derive(Subcommand)]
enum StageOp {
    /// Store a JSON value.
    Put { trace: String, value: String },
    /// Print a stored JSON value.
    Get { trace: String },
    Exists { trace: String },
    Copy { source: String, target: String },
    /// Delete every value below a prefix.
    Delete { prefix: String },
    /// Highest iteration below a content trace such as `loop/`.
    MaxIndex {
        trace: String,
        #[arg(long)]
        bound: Option<u32>,
    },
}

fn parse_input(s: &str) -> Result<(String, Value), String> {
    let (port, json) = s
        .split_once('=')
        .ok_or_else(|| format!("expected port=<json>, got '{s}'"))?;
    let value = serde_json::from_str(json).map_err(|e| format!("invalid JSON for '{port}': {e}"))?;
    Ok((port.to_owned(), value))
}

fn parse_trace(s: &str) -> Result<ExecutionTrace> {
    ExecutionTrace::parse(s).with_context(|| format!("invalid execution trace '{s}'"))
}

fn read_workflow(path: &Path) -> Result<Module> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli.command).await {
        if cli.json_errors {
            let report = ErrorReport::from_error(err.as_ref());
            match serde_json::to_string_pretty(&report) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{err:#}"),
            }
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Trace { trace } => {
            let trace = parse_trace(&trace)?;
            println!("canonical:  {trace}");
            println!("signature:  {}", grammar::signature(trace.elements()));
            match trace.element_type() {
                Ok(element_type) => println!("type:       {element_type:?}"),
                Err(_) => println!("type:       (empty)"),
            }
            println!("frames:     {}", trace.frames());
            println!("reference:  {}", trace.reference());
        }

        Command::Stage {
            base,
            hard_link_eligible,
            op,
        } => {
            let config = FileStagingAreaConfig {
                base_path: base,
                hard_link_eligible_paths: hard_link_eligible,
            };
            let area = FileStagingArea::new(config, Handle::current());
            stage(&area, op).await?;
        }

        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            engine::validate(&workflow).context("validation failed")?;
            let order: Vec<&str> = engine::validate_dag(&workflow)?
                .into_iter()
                .map(|m| m.name.as_str())
                .collect();
            println!("Workflow '{}' is valid ({}).", workflow.name, workflow.kind());
            if !order.is_empty() {
                println!("Execution order: {order:?}");
            }
        }

        Command::Run {
            path,
            base,
            inputs,
            max_retries,
            retry_base_delay_ms,
            max_iterations,
            discard_intermediates,
        } => {
            let workflow = read_workflow(&path)?;
            let config = InterpreterConfig {
                max_retries,
                retry_base_delay: Duration::from_millis(retry_base_delay_ms),
                retain_intermediates: !discard_intermediates,
                max_iterations,
            };
            let root = FileStagingArea::new(FileStagingAreaConfig::new(base), Handle::current())
                .with_module_lookup(Arc::new(workflow.clone()));
            let interpreter = Interpreter::new(modules::builtin::registry(), config);

            info!("running workflow '{}'", workflow.name);
            let result = interpreter
                .execute(&workflow, Arc::new(root), inputs.into_iter().collect())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result.outputs)?);
        }
    }
    Ok(())
}

async fn stage(area: &FileStagingArea, op: StageOp) -> Result<()> {
    match op {
        StageOp::Put { trace, value } => {
            let value: Value = serde_json::from_str(&value).context("value is not valid JSON")?;
            area.put_object(&parse_trace(&trace)?, &value).await?;
        }
        StageOp::Get { trace } => {
            let value = area.get_object(&parse_trace(&trace)?).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        StageOp::Exists { trace } => {
            if !area.exists(&parse_trace(&trace)?).await? {
                bail!("no value stored at '{trace}'");
            }
            println!("true");
        }
        StageOp::Copy { source, target } => {
            area.copy(&parse_trace(&source)?, &parse_trace(&target)?)
                .await?;
        }
        StageOp::Delete { prefix } => {
            area.delete(&parse_trace(&prefix)?).await?;
        }
        StageOp::MaxIndex { trace, bound } => {
            let maximum = area
                .get_maximum_index(&parse_trace(&trace)?, bound.map(Index::new))
                .await?;
            match maximum {
                Some(index) => println!("{index}"),
                None => println!("none"),
            }
        }
    }
    Ok(())
}
