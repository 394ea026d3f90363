//! Engine configuration.

/// Configuration for the execution engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
  /// Upper bound on the number of inputs with cached results. When the
  /// bound is reached, results for new inputs are simply not cached (the
  /// request still succeeds); existing cache lines keep accepting values.
  pub max_cached_inputs: Option<usize>,
}
