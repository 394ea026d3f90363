//! The execution engine.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use verbena_capability::{
  Capability, ExecuteError, InputHandle, Outcome, ValueType,
};
use verbena_job::{FamilyTag, Job, JobState, OnDone};
use verbena_registry::CapabilityRegistry;

use crate::config::EngineConfig;
use crate::environment::Environment;
use crate::invalidation::{ChangeEvent, InvalidationListener};
use crate::stats::{EngineStats, StatsSnapshot};
use crate::store::{DedupTable, ResultCache};

/// Options for an asynchronous submission.
#[derive(Default)]
pub struct SubmitOptions {
  /// Extra family tag for the job, added before scheduling.
  pub family: Option<FamilyTag>,
  /// Parent cancellation token; the job gets a child token, so cancelling
  /// the parent cancels the job.
  pub cancel: Option<CancellationToken>,
  /// Completion listener, fired with the terminal outcome.
  pub listener: Option<OnDone>,
}

impl SubmitOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn family(mut self, tag: FamilyTag) -> Self {
    self.family = Some(tag);
    self
  }

  pub fn parent_cancel(mut self, token: CancellationToken) -> Self {
    self.cancel = Some(token);
    self
  }

  pub fn on_done<F>(mut self, listener: F) -> Self
  where
    F: FnOnce(&Outcome) + Send + 'static,
  {
    self.listener = Some(Box::new(listener));
    self
  }
}

struct Shared {
  cache: ResultCache,
  inflight: DedupTable,
}

struct EngineInner {
  config: EngineConfig,
  registry: Arc<CapabilityRegistry>,
  environment: Option<Arc<dyn Environment>>,
  shared: Mutex<Shared>,
  invalidation_listeners: Mutex<Vec<Arc<dyn InvalidationListener>>>,
  stats: EngineStats,
}

/// The capability execution engine.
///
/// Owns the result cache and the dedup table behind a single coarse lock.
/// The lock covers bookkeeping decisions only; no capability body ever runs
/// while it is held. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ExecutionEngine {
  inner: Arc<EngineInner>,
}

/// Non-owning engine reference, used by capabilities (pipelines) that are
/// themselves registered in the engine's registry and would otherwise form
/// a reference cycle.
#[derive(Clone)]
pub struct WeakEngine {
  inner: Weak<EngineInner>,
}

impl WeakEngine {
  pub fn upgrade(&self) -> Option<ExecutionEngine> {
    self.inner.upgrade().map(|inner| ExecutionEngine { inner })
  }
}

impl ExecutionEngine {
  pub fn new(config: EngineConfig, registry: Arc<CapabilityRegistry>) -> Self {
    Self::with_environment(config, registry, None)
  }

  /// Create an engine with a host environment wrapped around impure
  /// capability executions.
  pub fn with_environment(
    config: EngineConfig,
    registry: Arc<CapabilityRegistry>,
    environment: Option<Arc<dyn Environment>>,
  ) -> Self {
    Self {
      inner: Arc::new(EngineInner {
        config,
        registry,
        environment,
        shared: Mutex::new(Shared {
          cache: ResultCache::default(),
          inflight: DedupTable::default(),
        }),
        invalidation_listeners: Mutex::new(Vec::new()),
        stats: EngineStats::default(),
      }),
    }
  }

  pub fn registry(&self) -> &Arc<CapabilityRegistry> {
    &self.inner.registry
  }

  pub fn downgrade(&self) -> WeakEngine {
    WeakEngine {
      inner: Arc::downgrade(&self.inner),
    }
  }

  pub fn stats(&self) -> StatsSnapshot {
    self.inner.stats.snapshot()
  }

  /// Attach an invalidation listener.
  pub fn add_invalidation_listener(&self, listener: Arc<dyn InvalidationListener>) {
    self
      .inner
      .invalidation_listeners
      .lock()
      .unwrap()
      .push(listener);
  }

  /// Submit a capability for asynchronous execution against an input.
  ///
  /// Never blocks and never fails: lookup or construction problems come
  /// back as an immediate job carrying the error. Concurrent submissions
  /// for the same `(input, capability)` key share one underlying
  /// execution; completed non-transient results are answered from the
  /// cache without running the body again.
  pub fn submit(
    &self,
    capability: &Arc<Capability>,
    input: &InputHandle,
    opts: SubmitOptions,
  ) -> Arc<Job> {
    let SubmitOptions {
      family,
      cancel,
      listener,
    } = opts;

    let mut shared = self.inner.shared.lock().unwrap();

    // 1. Result cache.
    if !capability.flags().transient
      && let Some(value) = shared.cache.get(input.id(), capability.id())
    {
      drop(shared);
      self.inner.stats.record_cache_hit();
      debug!(capability = %capability.id(), input = %input.id(), "cache hit");
      let outcome = if capability.return_type().matches(&value) {
        Outcome::Ok(value)
      } else {
        Outcome::Error(ExecuteError::TypeMismatch {
          capability: capability.id().to_string(),
          expected: capability.return_type(),
          actual: ValueType::of(&value),
        })
      };
      return self.schedule_immediate(capability.id(), input, outcome, listener);
    }

    // 2. Dedup table. A job whose cancellation was already requested is
    // obsolete and gets replaced instead of shared.
    if let Some(job) = shared.inflight.get(input.id(), capability.id())
      && !job.cancel_requested()
    {
      drop(shared);
      self.inner.stats.record_deduplicated();
      debug!(
        capability = %capability.id(),
        input = %input.id(),
        job_id = %job.id(),
        "attached to inflight job"
      );
      if let Some(listener) = listener {
        job.on_done(listener);
      }
      return job;
    }

    // 3. Fresh job.
    if !capability.param_type().matches(input.payload()) {
      drop(shared);
      let outcome = Outcome::Error(ExecuteError::TypeMismatch {
        capability: capability.id().to_string(),
        expected: capability.param_type(),
        actual: ValueType::of(input.payload()),
      });
      return self.schedule_immediate(capability.id(), input, outcome, listener);
    }

    self.inner.stats.record_cache_miss();
    self.inner.stats.record_execution();

    let token = match cancel {
      Some(parent) => parent.child_token(),
      None => CancellationToken::new(),
    };
    let mut families = HashSet::from([
      FamilyTag::Global,
      FamilyTag::Input(input.id()),
      FamilyTag::Capability(capability.id().to_string()),
    ]);
    if let Some(tag) = family {
      families.insert(tag);
    }
    let job = Arc::new(Job::new(capability.id(), input.clone(), token, families));
    shared.inflight.insert(input, capability.id(), job.clone());
    drop(shared);

    if let Some(listener) = listener {
      job.on_done(listener);
    }
    self.spawn_runner(capability.clone(), input.clone(), job.clone());
    job
  }

  /// Resolve a capability id through the registry and submit it. An
  /// unresolved id surfaces as an immediate job carrying the error.
  pub fn submit_by_id(&self, id: &str, input: &InputHandle, opts: SubmitOptions) -> Arc<Job> {
    match self.inner.registry.find(id) {
      Ok(capability) => self.submit(&capability, input, opts),
      Err(_) => {
        let outcome = Outcome::Error(ExecuteError::Unresolved { id: id.to_string() });
        self.schedule_immediate(id, input, outcome, opts.listener)
      }
    }
  }

  /// Execute a capability and wait for its value, re-raising failures.
  ///
  /// Prefer [`ExecutionEngine::submit`]; this variant parks the caller
  /// until the job completes.
  pub async fn execute(
    &self,
    capability: &Arc<Capability>,
    input: &InputHandle,
  ) -> Result<Value, ExecuteError> {
    let job = self.submit(capability, input, SubmitOptions::new());
    job.wait().await.into_result()
  }

  /// Cancel every inflight job belonging to a family. Bulk cancellation
  /// only; the jobs' runners reap their own table entries.
  pub fn cancel_family(&self, tag: &FamilyTag) {
    let jobs = {
      let shared = self.inner.shared.lock().unwrap();
      shared.inflight.jobs()
    };
    let mut cancelled = 0usize;
    for job in jobs {
      if job.in_family(tag) {
        job.cancel();
        cancelled += 1;
      }
    }
    info!(family = ?tag, cancelled, "family cancellation requested");
  }

  /// Apply a batch of resource-change events: drop every cache line and
  /// cancel every inflight job whose input conflicts with a change, then
  /// republish each event's invalidated inputs to the registered
  /// listeners. Returns the union of invalidated inputs.
  pub fn invalidate(&self, batch: &[ChangeEvent]) -> Vec<InputHandle> {
    let mut all: Vec<InputHandle> = Vec::new();
    for event in batch {
      let invalidated = self.invalidate_event(event);
      self.inner.stats.record_invalidated(invalidated.len());
      if !invalidated.is_empty() {
        info!(
          resource = %event.resource(),
          inputs = invalidated.len(),
          "invalidated inputs for changed resource"
        );
      }
      for listener in self.invalidation_listeners_snapshot() {
        listener.on_invalidate(&invalidated, event);
      }
      for input in invalidated {
        if !all.contains(&input) {
          all.push(input);
        }
      }
    }
    all
  }

  fn invalidate_event(&self, event: &ChangeEvent) -> Vec<InputHandle> {
    let mut shared = self.inner.shared.lock().unwrap();
    let mut invalidated: Vec<InputHandle> = Vec::new();

    for input in shared.cache.inputs() {
      if event.conflicts_with(&input) {
        shared.cache.remove_line(input.id());
        invalidated.push(input);
      }
    }
    for input in shared.inflight.inputs() {
      if event.conflicts_with(&input) {
        for job in shared.inflight.remove_line(input.id()) {
          job.cancel();
        }
        if !invalidated.contains(&input) {
          invalidated.push(input);
        }
      }
    }
    invalidated
  }

  fn invalidation_listeners_snapshot(&self) -> Vec<Arc<dyn InvalidationListener>> {
    self.inner.invalidation_listeners.lock().unwrap().clone()
  }

  fn schedule_immediate(
    &self,
    capability_id: &str,
    input: &InputHandle,
    outcome: Outcome,
    listener: Option<OnDone>,
  ) -> Arc<Job> {
    let job = Arc::new(Job::immediate(capability_id, input.clone()));
    if let Some(listener) = listener {
      job.on_done(listener);
    }
    job.advance(JobState::Scheduled);
    // Completion is delivered out-of-band, never on the caller's stack.
    let scheduled = job.clone();
    tokio::spawn(async move {
      scheduled.complete(outcome);
    });
    job
  }

  fn spawn_runner(&self, capability: Arc<Capability>, input: InputHandle, job: Arc<Job>) {
    job.advance(JobState::Scheduled);
    let engine = self.clone();
    tokio::spawn(async move {
      job.advance(JobState::Running);
      // The body runs in its own task so a panicking body cannot unwind
      // past finalize; the dedup entry must be reaped and the job
      // completed no matter how the body dies.
      let body_task = {
        let engine = engine.clone();
        let capability = capability.clone();
        let input = input.clone();
        let job = job.clone();
        tokio::spawn(async move { engine.run_body(&capability, &input, &job).await })
      };
      let outcome = match body_task.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
          error!(
            capability = %capability.id(),
            job_id = %job.id(),
            panicked = join_error.is_panic(),
            "capability body died"
          );
          Outcome::Error(ExecuteError::execution(
            capability.id(),
            if join_error.is_panic() {
              "capability body panicked"
            } else {
              "capability body task aborted"
            },
          ))
        }
      };
      engine.finalize(&capability, &input, &job, outcome);
    });
  }

  #[instrument(
    name = "capability_execute",
    skip(self, capability, input, job),
    fields(
      capability = %capability.id(),
      input = %input.id(),
      job_id = %job.id(),
    )
  )]
  async fn run_body(
    &self,
    capability: &Arc<Capability>,
    input: &InputHandle,
    job: &Arc<Job>,
  ) -> Outcome {
    if job.cancel_requested() {
      return Outcome::Cancelled;
    }

    info!("capability execution started");

    // Impure capabilities get the host environment's setup/teardown.
    let environment = if capability.flags().pure {
      None
    } else {
      self.inner.environment.clone()
    };
    let effective_input = match &environment {
      Some(environment) => match environment.prepare(input).await {
        Ok(prepared) => prepared,
        Err(error) => return Outcome::Error(error),
      },
      None => input.clone(),
    };

    let result = capability
      .body()
      .run(&effective_input, job.cancel_token())
      .await;

    if let Some(environment) = &environment {
      environment.cleanup(&effective_input).await;
    }

    let outcome = match result {
      Err(ExecuteError::Cancelled) => Outcome::Cancelled,
      Err(error) => Outcome::Error(error),
      Ok(value) => {
        if value.is_null() {
          Outcome::Error(ExecuteError::Malformed {
            id: capability.id().to_string(),
            message: "body produced a null value".to_string(),
          })
        } else if !capability.return_type().matches(&value) {
          Outcome::Error(ExecuteError::TypeMismatch {
            capability: capability.id().to_string(),
            expected: capability.return_type(),
            actual: ValueType::of(&value),
          })
        } else {
          match Outcome::ok(value) {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Error(ExecuteError::Malformed {
              id: capability.id().to_string(),
              message: error.to_string(),
            }),
          }
        }
      }
    };

    match &outcome {
      Outcome::Ok(_) => info!("capability execution completed"),
      Outcome::Error(error) => warn!(error = %error, "capability execution failed"),
      Outcome::Cancelled => info!("capability execution cancelled"),
    }
    outcome
  }

  /// Terminal bookkeeping for a finished runner. Cache write and dedup
  /// removal happen inside one critical section, write first, so a racing
  /// submitter can never observe a completed key in neither structure.
  fn finalize(
    &self,
    capability: &Arc<Capability>,
    input: &InputHandle,
    job: &Arc<Job>,
    mut outcome: Outcome,
  ) {
    // A cancellation requested mid-run (invalidation, family cancel) makes
    // the produced value stale even if the body never observed the flag.
    if job.cancel_requested() && !outcome.is_cancelled() {
      debug!(job_id = %job.id(), "discarding result of cancelled job");
      outcome = Outcome::Cancelled;
    }

    {
      let mut shared = self.inner.shared.lock().unwrap();
      let owns_entry = shared
        .inflight
        .owns_entry(input.id(), capability.id(), job);
      if owns_entry
        && !capability.flags().transient
        && let Outcome::Ok(value) = &outcome
      {
        let within_bound = self.inner.config.max_cached_inputs.is_none_or(|max| {
          shared.cache.contains_input(input.id()) || shared.cache.input_count() < max
        });
        if within_bound {
          shared.cache.insert(input, capability.id(), value.clone());
        } else {
          warn!(
            capability = %capability.id(),
            input = %input.id(),
            "result cache is full, treating as cache miss"
          );
        }
      }
      shared.inflight.remove_job(input.id(), capability.id(), job);
    }

    job.complete(outcome);
  }
}
