//! Execution error kinds.

use crate::value_type::ValueType;

/// Errors a capability execution can terminate with.
///
/// All of these are captured into a job's terminal [`crate::Outcome`] rather
/// than thrown across the submit boundary; only the blocking `execute`
/// variant re-raises them to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
  /// The capability's own computation failed.
  #[error("capability '{capability}' failed: {message}")]
  Execution { capability: String, message: String },

  /// Cooperative cancellation was honored.
  #[error("execution cancelled")]
  Cancelled,

  /// A dynamic binding could not find the capability id in the registry.
  #[error("capability '{id}' is not registered")]
  Unresolved { id: String },

  /// The capability failed to produce a usable result at all.
  #[error("capability '{id}' produced no result: {message}")]
  Malformed { id: String, message: String },

  /// A cached or supplied value's runtime type contradicts the declared type.
  #[error("type mismatch in capability '{capability}': expected {expected}, actual {actual}")]
  TypeMismatch {
    capability: String,
    expected: ValueType,
    actual: ValueType,
  },
}

impl ExecuteError {
  /// Wrap an arbitrary failure cause in an `Execution` error.
  pub fn execution(capability: impl Into<String>, cause: impl std::fmt::Display) -> Self {
    ExecuteError::Execution {
      capability: capability.into(),
      message: cause.to_string(),
    }
  }
}
