//! Pipeline construction errors.

use verbena_capability::ValueType;

/// Errors that can occur while building a pipeline.
///
/// Runtime stage failures are not represented here; a running pipeline
/// completes with the failing stage's own
/// [`verbena_capability::ExecuteError`], unwrapped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
  /// The pipeline has no stages.
  #[error("pipeline '{id}' has no stages")]
  Empty { id: String },

  /// Static binding could not resolve a component id.
  #[error("stage '{stage}' of pipeline '{id}' is not registered")]
  UnresolvedStage { id: String, stage: String },

  /// Adjacent stages have incompatible types.
  #[error(
    "stage {index} of pipeline '{id}' expects {expected}, previous stage produces {actual}"
  )]
  StageTypeMismatch {
    id: String,
    index: usize,
    expected: ValueType,
    actual: ValueType,
  },
}
