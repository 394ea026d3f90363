//! The result cache and the dedup (inflight) table.
//!
//! Both are two-level maps: outer key is the input's identity token, inner
//! key the capability id. The outer level lets invalidation drop an entire
//! input's line in one step. Neither structure locks; the engine guards
//! both behind a single mutex.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use verbena_capability::{InputHandle, InputId};
use verbena_job::Job;

struct CacheLine {
  input: InputHandle,
  values: HashMap<String, Value>,
}

/// Memoized results of non-transient capability executions.
#[derive(Default)]
pub(crate) struct ResultCache {
  lines: HashMap<InputId, CacheLine>,
}

impl ResultCache {
  pub(crate) fn get(&self, input: InputId, capability_id: &str) -> Option<Value> {
    self
      .lines
      .get(&input)
      .and_then(|line| line.values.get(capability_id))
      .cloned()
  }

  pub(crate) fn insert(&mut self, input: &InputHandle, capability_id: &str, value: Value) {
    self
      .lines
      .entry(input.id())
      .or_insert_with(|| CacheLine {
        input: input.clone(),
        values: HashMap::new(),
      })
      .values
      .insert(capability_id.to_string(), value);
  }

  pub(crate) fn contains_input(&self, input: InputId) -> bool {
    self.lines.contains_key(&input)
  }

  pub(crate) fn input_count(&self) -> usize {
    self.lines.len()
  }

  /// Handles of all inputs that currently have any cached result.
  pub(crate) fn inputs(&self) -> Vec<InputHandle> {
    self.lines.values().map(|line| line.input.clone()).collect()
  }

  /// Drop an input's entire cache line.
  pub(crate) fn remove_line(&mut self, input: InputId) -> bool {
    self.lines.remove(&input).is_some()
  }
}

struct InflightLine {
  input: InputHandle,
  jobs: HashMap<String, Arc<Job>>,
}

/// Currently running jobs, keyed like the cache. Used to share one
/// execution among concurrent requesters for the same key.
#[derive(Default)]
pub(crate) struct DedupTable {
  lines: HashMap<InputId, InflightLine>,
}

impl DedupTable {
  pub(crate) fn get(&self, input: InputId, capability_id: &str) -> Option<Arc<Job>> {
    self
      .lines
      .get(&input)
      .and_then(|line| line.jobs.get(capability_id))
      .cloned()
  }

  pub(crate) fn insert(&mut self, input: &InputHandle, capability_id: &str, job: Arc<Job>) {
    self
      .lines
      .entry(input.id())
      .or_insert_with(|| InflightLine {
        input: input.clone(),
        jobs: HashMap::new(),
      })
      .jobs
      .insert(capability_id.to_string(), job);
  }

  /// Whether the given job is still the registered entry for its key. A
  /// job that lost its entry (invalidated, or superseded after its own
  /// cancellation) must not repopulate the cache.
  pub(crate) fn owns_entry(&self, input: InputId, capability_id: &str, job: &Arc<Job>) -> bool {
    self
      .lines
      .get(&input)
      .and_then(|line| line.jobs.get(capability_id))
      .is_some_and(|registered| Arc::ptr_eq(registered, job))
  }

  /// Remove the entry for a key, but only if it still belongs to `job`.
  pub(crate) fn remove_job(&mut self, input: InputId, capability_id: &str, job: &Arc<Job>) {
    let emptied = match self.lines.get_mut(&input) {
      Some(line) => {
        if line
          .jobs
          .get(capability_id)
          .is_some_and(|registered| Arc::ptr_eq(registered, job))
        {
          line.jobs.remove(capability_id);
        }
        line.jobs.is_empty()
      }
      None => false,
    };
    if emptied {
      self.lines.remove(&input);
    }
  }

  /// Handles of all inputs that currently have inflight jobs.
  pub(crate) fn inputs(&self) -> Vec<InputHandle> {
    self.lines.values().map(|line| line.input.clone()).collect()
  }

  /// Drop an input's line, returning the jobs that were inflight for it.
  pub(crate) fn remove_line(&mut self, input: InputId) -> Vec<Arc<Job>> {
    match self.lines.remove(&input) {
      Some(line) => line.jobs.into_values().collect(),
      None => Vec::new(),
    }
  }

  /// All inflight jobs, across every input.
  pub(crate) fn jobs(&self) -> Vec<Arc<Job>> {
    self
      .lines
      .values()
      .flat_map(|line| line.jobs.values().cloned())
      .collect()
  }
}
