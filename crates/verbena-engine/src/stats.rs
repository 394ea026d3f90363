//! Engine observation counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct EngineStats {
  cache_hits: AtomicU64,
  cache_misses: AtomicU64,
  executions: AtomicU64,
  deduplicated: AtomicU64,
  invalidated_inputs: AtomicU64,
}

impl EngineStats {
  pub(crate) fn record_cache_hit(&self) {
    self.cache_hits.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_cache_miss(&self) {
    self.cache_misses.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_execution(&self) {
    self.executions.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_deduplicated(&self) {
    self.deduplicated.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_invalidated(&self, inputs: usize) {
    self
      .invalidated_inputs
      .fetch_add(inputs as u64, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      cache_hits: self.cache_hits.load(Ordering::Relaxed),
      cache_misses: self.cache_misses.load(Ordering::Relaxed),
      executions: self.executions.load(Ordering::Relaxed),
      deduplicated: self.deduplicated.load(Ordering::Relaxed),
      invalidated_inputs: self.invalidated_inputs.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time view of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
  /// Submissions answered from the result cache.
  pub cache_hits: u64,
  /// Submissions that found neither a cached value nor an inflight job.
  pub cache_misses: u64,
  /// Fresh jobs actually scheduled.
  pub executions: u64,
  /// Submissions attached to an already-inflight job.
  pub deduplicated: u64,
  /// Inputs evicted by invalidation events.
  pub invalidated_inputs: u64,
}
