//! Integration tests for the invalidation engine and the change worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use verbena_capability::{
  Capability, CapabilityBody, ExecuteError, InputHandle, InputId, Outcome,
};
use verbena_engine::{
  ChangeEvent, ChangeWorker, EngineConfig, ExecutionEngine, InvalidationListener, SubmitOptions,
};
use verbena_registry::CapabilityRegistry;

fn engine() -> ExecutionEngine {
  ExecutionEngine::new(EngineConfig::default(), Arc::new(CapabilityRegistry::new()))
}

fn counting_capability(id: &str, runs: Arc<AtomicUsize>) -> Arc<Capability> {
  Capability::builder(id, "Count")
    .pure(true)
    .build_fn(move |input| {
      runs.fetch_add(1, Ordering::SeqCst);
      let len = input.payload().as_array().map(|a| a.len()).unwrap_or(0);
      Ok(json!(len))
    })
}

struct GatedBody {
  gate: Arc<tokio::sync::Semaphore>,
}

#[async_trait]
impl CapabilityBody for GatedBody {
  async fn run(
    &self,
    _input: &InputHandle,
    cancel: &CancellationToken,
  ) -> Result<Value, ExecuteError> {
    tokio::select! {
      _ = cancel.cancelled() => Err(ExecuteError::Cancelled),
      permit = self.gate.acquire() => {
        permit.unwrap().forget();
        Ok(json!("slow result"))
      }
    }
  }
}

/// An event that conflicts with exactly one input identity.
fn change_for(resource: &str, target: InputId) -> ChangeEvent {
  ChangeEvent::new(resource, move |input: &InputHandle| input.id() == target)
}

#[tokio::test]
async fn test_invalidation_is_precise() {
  let engine = engine();
  let runs = Arc::new(AtomicUsize::new(0));
  let count = counting_capability("count", runs.clone());
  let a = InputHandle::new(json!([1]));
  let b = InputHandle::new(json!([1, 2]));

  engine.execute(&count, &a).await.unwrap();
  engine.execute(&count, &b).await.unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 2);

  // An in-flight job for input A, on a different capability.
  let gate = Arc::new(tokio::sync::Semaphore::new(0));
  let slow = Capability::builder("slow", "Slow")
    .pure(true)
    .build(Arc::new(GatedBody { gate: gate.clone() }));
  let inflight = engine.submit(&slow, &a, SubmitOptions::new());

  let invalidated = engine.invalidate(&[change_for("file:///a", a.id())]);
  assert_eq!(invalidated, vec![a.clone()]);
  assert_eq!(inflight.wait().await, Outcome::Cancelled);

  // B's cache line survived.
  engine.execute(&count, &b).await.unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 2);

  // A's line is gone, so the body runs again.
  assert_eq!(engine.execute(&count, &a).await.unwrap(), json!(1));
  assert_eq!(runs.load(Ordering::SeqCst), 3);
  assert_eq!(engine.stats().invalidated_inputs, 1);
}

#[tokio::test]
async fn test_invalidated_job_does_not_repopulate_cache() {
  let engine = engine();
  let gate = Arc::new(tokio::sync::Semaphore::new(0));
  let slow = Capability::builder("slow", "Slow")
    .pure(true)
    .build(Arc::new(GatedBody { gate: gate.clone() }));
  let input = InputHandle::new(json!("resource"));

  let job = engine.submit(&slow, &input, SubmitOptions::new());
  engine.invalidate(&[change_for("file:///r", input.id())]);

  // Release the gate after invalidation; the body may or may not have
  // observed the flag, but its result must not survive either way.
  gate.add_permits(1);
  assert_eq!(job.wait().await, Outcome::Cancelled);

  let rerun = engine.submit(&slow, &input, SubmitOptions::new());
  assert!(!rerun.is_immediate());
  gate.add_permits(1);
  assert_eq!(rerun.wait().await, Outcome::Ok(json!("slow result")));
}

#[tokio::test]
async fn test_listeners_receive_invalidated_inputs() {
  struct Recorder(Mutex<Vec<(String, Vec<InputId>)>>);
  impl InvalidationListener for Recorder {
    fn on_invalidate(&self, invalidated: &[InputHandle], event: &ChangeEvent) {
      self.0.lock().unwrap().push((
        event.resource().to_string(),
        invalidated.iter().map(|input| input.id()).collect(),
      ));
    }
  }

  let engine = engine();
  let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
  engine.add_invalidation_listener(recorder.clone());

  let runs = Arc::new(AtomicUsize::new(0));
  let count = counting_capability("count", runs);
  let a = InputHandle::new(json!([1]));
  engine.execute(&count, &a).await.unwrap();

  engine.invalidate(&[
    change_for("file:///a", a.id()),
    ChangeEvent::new("file:///other", |_: &InputHandle| false),
  ]);

  let events = recorder.0.lock().unwrap().clone();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0], ("file:///a".to_string(), vec![a.id()]));
  assert_eq!(events[1], ("file:///other".to_string(), Vec::new()));
}

#[tokio::test]
async fn test_change_worker_drains_batches() {
  let engine = engine();
  let runs = Arc::new(AtomicUsize::new(0));
  let count = counting_capability("count", runs.clone());
  let input = InputHandle::new(json!([1, 2, 3]));
  engine.execute(&count, &input).await.unwrap();

  let worker = ChangeWorker::new(engine.clone());
  let sender = worker.sender();
  let cancel = CancellationToken::new();
  let handle = tokio::spawn(worker.start(cancel.clone()));

  sender
    .send(vec![change_for("file:///r", input.id())])
    .await
    .unwrap();

  // Wait for the worker to apply the batch.
  let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
  while engine.stats().invalidated_inputs == 0 {
    assert!(tokio::time::Instant::now() < deadline, "worker never applied batch");
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  engine.execute(&count, &input).await.unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 2);

  cancel.cancel();
  handle.await.unwrap();
}
