//! Environment hook for impure capabilities.

use async_trait::async_trait;
use verbena_capability::{ExecuteError, InputHandle};

/// Host-supplied setup/teardown around impure capability executions.
///
/// Pure capabilities bypass the environment entirely. For every impure
/// execution the engine calls `prepare` before the body runs, feeds the
/// body the prepared input, and calls `cleanup` afterwards regardless of
/// how the body finished.
#[async_trait]
pub trait Environment: Send + Sync {
  /// Resolve environment-specific preconditions for an input, returning
  /// the input the body should actually run against.
  async fn prepare(&self, input: &InputHandle) -> Result<InputHandle, ExecuteError>;

  /// Release whatever `prepare` set up.
  async fn cleanup(&self, _input: &InputHandle) {}
}
