use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use verbena_capability::{Capability, ExecuteError, InputHandle, ValueType};
use verbena_engine::{EngineConfig, ExecutionEngine};
use verbena_pipeline::Pipeline;
use verbena_registry::CapabilityRegistry;

/// Verbena - a capability execution engine with caching and invalidation
#[derive(Parser)]
#[command(name = "verbena")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Upper bound on the number of inputs with cached results
  #[arg(long, global = true)]
  max_cached_inputs: Option<usize>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a capability or a pipeline against a payload read from stdin
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },

  /// List the built-in sample capabilities
  List,
}

#[derive(Subcommand)]
enum RunTarget {
  /// Run a single capability by id
  Capability {
    /// The capability id to execute
    id: String,

    /// Submit the same input this many times (shows caching)
    #[arg(long, default_value_t = 1)]
    repeat: usize,
  },

  /// Run the given capability ids as a statically bound pipeline
  Pipeline {
    /// Stage ids, executed left to right
    ids: Vec<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let config = EngineConfig {
    max_cached_inputs: cli.max_cached_inputs,
  };

  match cli.command {
    Some(Commands::Run { target }) => match target {
      RunTarget::Capability { id, repeat } => {
        run_capability(config, id, repeat)?;
      }
      RunTarget::Pipeline { ids } => {
        run_pipeline(config, ids)?;
      }
    },
    Some(Commands::List) => {
      for capability in sample_registry().query(|_| true) {
        println!("{}\t{}", capability.id(), capability.name());
      }
    }
    None => {
      println!("verbena - use --help to see available commands");
    }
  }

  Ok(())
}

fn run_capability(config: EngineConfig, id: String, repeat: usize) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_capability_async(config, id, repeat).await })
}

async fn run_capability_async(config: EngineConfig, id: String, repeat: usize) -> Result<()> {
  let engine = ExecutionEngine::new(config, sample_registry());
  let capability = engine
    .registry()
    .find(&id)
    .with_context(|| format!("capability '{}' is not registered", id))?;

  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {}", payload);

  let input = InputHandle::new(payload);
  let mut result = serde_json::Value::Null;
  for _ in 0..repeat.max(1) {
    result = engine
      .execute(&capability, &input)
      .await
      .with_context(|| format!("capability '{}' failed", id))?;
  }

  let stats = engine.stats();
  eprintln!(
    "Executions: {} (cache hits: {}, deduplicated: {})",
    stats.executions, stats.cache_hits, stats.deduplicated
  );

  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}

fn run_pipeline(config: EngineConfig, ids: Vec<String>) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_pipeline_async(config, ids).await })
}

async fn run_pipeline_async(config: EngineConfig, ids: Vec<String>) -> Result<()> {
  let engine = ExecutionEngine::new(config, sample_registry());

  let mut builder = Pipeline::builder("cli-pipeline", "CLI Pipeline");
  for id in &ids {
    builder = builder.stage_id(id);
  }
  let pipeline = builder
    .build_static(&engine)
    .context("failed to build pipeline")?;

  eprintln!(
    "Built pipeline with {} stages ({} -> {})",
    ids.len(),
    pipeline.param_type(),
    pipeline.return_type()
  );

  let payload = read_payload_from_stdin()?;
  eprintln!("Payload: {}", payload);

  let result = engine
    .execute(&pipeline, &InputHandle::new(payload))
    .await
    .context("pipeline execution failed")?;

  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}

/// The built-in sample capabilities.
fn sample_registry() -> Arc<CapabilityRegistry> {
  let registry = CapabilityRegistry::new();

  registry.register(
    Capability::builder("count", "Count")
      .return_type(ValueType::Number)
      .pure(true)
      .build_fn(|input| {
        let count = match input.payload() {
          serde_json::Value::Array(items) => items.len(),
          serde_json::Value::String(s) => s.chars().count(),
          serde_json::Value::Object(map) => map.len(),
          _ => 1,
        };
        Ok(json!(count))
      }),
  );

  registry.register(
    Capability::builder("uppercase", "Uppercase")
      .param_type(ValueType::String)
      .return_type(ValueType::String)
      .pure(true)
      .build_fn(|input| {
        let s = input.payload().as_str().unwrap_or_default();
        Ok(json!(s.to_uppercase()))
      }),
  );

  registry.register(
    Capability::builder("sum", "Sum")
      .param_type(ValueType::Array)
      .return_type(ValueType::Number)
      .pure(true)
      .build_fn(|input| {
        let items = input.payload().as_array().cloned().unwrap_or_default();
        let mut total = 0.0;
        for item in &items {
          total += item
            .as_f64()
            .ok_or_else(|| ExecuteError::execution("sum", format!("not a number: {}", item)))?;
        }
        Ok(json!(total))
      }),
  );

  registry.register(
    Capability::builder("now", "Now")
      .return_type(ValueType::String)
      .transient(true)
      .build_fn(|_| {
        let elapsed = std::time::SystemTime::now()
          .duration_since(std::time::UNIX_EPOCH)
          .map_err(|e| ExecuteError::execution("now", e))?;
        Ok(json!(format!("{}", elapsed.as_millis())))
      }),
  );

  Arc::new(registry)
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
