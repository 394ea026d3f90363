//! Integration tests for pipeline composition and execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use verbena_capability::{
  Capability, CapabilityBody, ExecuteError, InputHandle, Outcome, ValueType,
};
use verbena_engine::{EngineConfig, ExecutionEngine, SubmitOptions};
use verbena_pipeline::{Pipeline, PipelineError};
use verbena_registry::CapabilityRegistry;

fn engine() -> ExecutionEngine {
  ExecutionEngine::new(EngineConfig::default(), Arc::new(CapabilityRegistry::new()))
}

fn arithmetic(id: &str, f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Arc<Capability> {
  Capability::builder(id, id.to_uppercase())
    .param_type(ValueType::Number)
    .return_type(ValueType::Number)
    .pure(true)
    .build_fn(move |input| {
      let n = input.payload().as_f64().unwrap_or(0.0);
      Ok(json!(f(n)))
    })
}

fn counted(
  id: &str,
  runs: Arc<AtomicUsize>,
  result: Result<Value, ExecuteError>,
) -> Arc<Capability> {
  Capability::builder(id, id.to_uppercase())
    .pure(true)
    .build_fn(move |_| {
      runs.fetch_add(1, Ordering::SeqCst);
      result.clone()
    })
}

#[tokio::test]
async fn test_stages_chain_left_to_right() {
  let engine = engine();
  let pipeline = Pipeline::builder("math", "Math")
    .stage(arithmetic("double", |n| n * 2.0))
    .stage(arithmetic("inc", |n| n + 1.0))
    .build_static(&engine)
    .unwrap();

  assert_eq!(pipeline.param_type(), ValueType::Number);
  assert_eq!(pipeline.return_type(), ValueType::Number);
  assert!(pipeline.flags().pure);

  let result = engine
    .execute(&pipeline, &InputHandle::new(json!(5)))
    .await
    .unwrap();
  assert_eq!(result, json!(11.0));
}

#[tokio::test]
async fn test_fail_fast_skips_later_stages() {
  let engine = engine();
  let first_runs = Arc::new(AtomicUsize::new(0));
  let third_runs = Arc::new(AtomicUsize::new(0));
  let error = ExecuteError::execution("explode", "stage two exploded");

  let pipeline = Pipeline::builder("doomed", "Doomed")
    .stage(counted("ok", first_runs.clone(), Ok(json!("fine"))))
    .stage(counted("explode", Arc::new(AtomicUsize::new(0)), Err(error.clone())))
    .stage(counted("never", third_runs.clone(), Ok(json!("unreached"))))
    .build_static(&engine)
    .unwrap();

  let job = engine.submit(
    &pipeline,
    &InputHandle::new(json!("start")),
    SubmitOptions::new(),
  );
  // The failing stage's exact error, unwrapped.
  assert_eq!(job.wait().await, Outcome::Error(error));
  assert_eq!(first_runs.load(Ordering::SeqCst), 1);
  assert_eq!(third_runs.load(Ordering::SeqCst), 0);
  // Jobs scheduled: the pipeline itself plus stages one and two.
  assert_eq!(engine.stats().executions, 3);
}

#[tokio::test]
async fn test_intermediate_null_is_rejected() {
  let engine = engine();
  let third_runs = Arc::new(AtomicUsize::new(0));
  let pipeline = Pipeline::builder("nully", "Nully")
    .stage(counted("nothing", Arc::new(AtomicUsize::new(0)), Ok(json!(null))))
    .stage(counted("never", third_runs.clone(), Ok(json!("unreached"))))
    .build_static(&engine)
    .unwrap();

  match engine
    .execute(&pipeline, &InputHandle::new(json!("start")))
    .await
  {
    Err(ExecuteError::Malformed { id, .. }) => assert_eq!(id, "nothing"),
    other => panic!("expected malformed error, got {other:?}"),
  }
  assert_eq!(third_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_static_build_fails_fast_on_unresolved_stage() {
  let engine = engine();
  let result = Pipeline::builder("broken", "Broken")
    .stage(arithmetic("double", |n| n * 2.0))
    .stage_id("missing")
    .build_static(&engine);
  assert_eq!(
    result.err(),
    Some(PipelineError::UnresolvedStage {
      id: "broken".to_string(),
      stage: "missing".to_string(),
    })
  );
}

#[tokio::test]
async fn test_static_build_checks_stage_adjacency() {
  let engine = engine();
  let stringify = Capability::builder("stringify", "Stringify")
    .param_type(ValueType::Number)
    .return_type(ValueType::String)
    .pure(true)
    .build_fn(|input| Ok(json!(input.payload().to_string())));

  let result = Pipeline::builder("mismatched", "Mismatched")
    .stage(stringify)
    .stage(arithmetic("double", |n| n * 2.0))
    .build_static(&engine);
  assert_eq!(
    result.err(),
    Some(PipelineError::StageTypeMismatch {
      id: "mismatched".to_string(),
      index: 1,
      expected: ValueType::Number,
      actual: ValueType::String,
    })
  );
}

#[tokio::test]
async fn test_empty_pipeline_is_rejected() {
  let engine = engine();
  assert_eq!(
    Pipeline::builder("empty", "Empty").build_static(&engine).err(),
    Some(PipelineError::Empty {
      id: "empty".to_string()
    })
  );
}

#[tokio::test]
async fn test_dynamic_binding_tolerates_hot_reload() {
  let engine = engine();
  let registry = engine.registry().clone();
  registry.register(
    Capability::builder("greet", "Greet v1")
      .pure(true)
      .build_fn(|_| Ok(json!("hello"))),
  );

  let pipeline = Pipeline::builder("greeter", "Greeter")
    .stage_id("greet")
    .build_dynamic(&engine)
    .unwrap();

  let first = engine
    .execute(&pipeline, &InputHandle::new(json!("x")))
    .await
    .unwrap();
  assert_eq!(first, json!("hello"));

  // Hot-swap the component; the next run picks up the new binding.
  registry.register(
    Capability::builder("greet", "Greet v2")
      .pure(true)
      .build_fn(|_| Ok(json!("bonjour"))),
  );
  let second = engine
    .execute(&pipeline, &InputHandle::new(json!("y")))
    .await
    .unwrap();
  assert_eq!(second, json!("bonjour"));
}

#[tokio::test]
async fn test_dynamic_build_derives_types_from_resolved_stages() {
  let engine = engine();
  engine
    .registry()
    .register(arithmetic("double", |n| n * 2.0));

  // A named stage that resolves right now contributes its real types.
  let pipeline = Pipeline::builder("dyn-math", "Dyn Math")
    .stage_id("double")
    .build_dynamic(&engine)
    .unwrap();
  assert_eq!(pipeline.param_type(), ValueType::Number);
  assert_eq!(pipeline.return_type(), ValueType::Number);
  assert!(pipeline.flags().pure);

  // Only an unresolved boundary stage falls back to untyped.
  let ghost = Pipeline::builder("ghost", "Ghost")
    .stage_id("missing")
    .build_dynamic(&engine)
    .unwrap();
  assert_eq!(ghost.param_type(), ValueType::Any);
  assert_eq!(ghost.return_type(), ValueType::Any);
}

#[tokio::test]
async fn test_dynamic_binding_surfaces_unresolved_at_run() {
  let engine = engine();
  let pipeline = Pipeline::builder("ghost", "Ghost")
    .stage_id("missing")
    .build_dynamic(&engine)
    .unwrap();
  // Unresolved stages make the derived flags conservative.
  assert!(pipeline.flags().transient);

  assert_eq!(
    engine
      .execute(&pipeline, &InputHandle::new(json!("x")))
      .await,
    Err(ExecuteError::Unresolved {
      id: "missing".to_string()
    })
  );
}

#[tokio::test]
async fn test_transient_component_makes_pipeline_transient() {
  let engine = engine();
  let runs = Arc::new(AtomicUsize::new(0));
  let counter = runs.clone();
  let transient = Capability::builder("tick", "Tick")
    .pure(true)
    .transient(true)
    .build_fn(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(json!("tick"))
    });

  let pipeline = Pipeline::builder("ticker", "Ticker")
    .stage(transient)
    .build_static(&engine)
    .unwrap();
  assert!(pipeline.flags().transient);

  let input = InputHandle::new(json!("x"));
  engine.execute(&pipeline, &input).await.unwrap();
  engine.execute(&pipeline, &input).await.unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pure_pipeline_results_are_cached() {
  let engine = engine();
  let runs = Arc::new(AtomicUsize::new(0));
  let pipeline = Pipeline::builder("memo", "Memo")
    .stage(counted("work", runs.clone(), Ok(json!("done"))))
    .build_static(&engine)
    .unwrap();

  let input = InputHandle::new(json!("x"));
  engine.execute(&pipeline, &input).await.unwrap();
  engine.execute(&pipeline, &input).await.unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_is_checked_between_stages() {
  struct ParkedBody;

  #[async_trait]
  impl CapabilityBody for ParkedBody {
    async fn run(
      &self,
      _input: &InputHandle,
      cancel: &CancellationToken,
    ) -> Result<Value, ExecuteError> {
      cancel.cancelled().await;
      Err(ExecuteError::Cancelled)
    }
  }

  let engine = engine();
  let second_runs = Arc::new(AtomicUsize::new(0));
  let parked = Capability::builder("parked", "Parked")
    .pure(true)
    .build(Arc::new(ParkedBody));
  let pipeline = Pipeline::builder("stuck", "Stuck")
    .stage(parked)
    .stage(counted("after", second_runs.clone(), Ok(json!("unreached"))))
    .build_static(&engine)
    .unwrap();

  let parent = CancellationToken::new();
  let job = engine.submit(
    &pipeline,
    &InputHandle::new(json!("x")),
    SubmitOptions::new().parent_cancel(parent.clone()),
  );
  tokio::task::yield_now().await;
  parent.cancel();

  assert_eq!(job.wait().await, Outcome::Cancelled);
  assert_eq!(second_runs.load(Ordering::SeqCst), 0);
}
