//! Terminal results of a capability execution.

use serde_json::Value;

use crate::error::ExecuteError;

/// Error raised when constructing an `Ok` outcome around a null value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ok outcome requires a non-null value")]
pub struct NullValue;

/// The terminal result of one capability execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  /// Successful completion. The value is never null; see [`Outcome::ok`].
  Ok(Value),
  /// The execution failed.
  Error(ExecuteError),
  /// Cooperative cancellation was honored before a result was produced.
  Cancelled,
}

impl Outcome {
  /// Construct a successful outcome. Rejects `null` at construction time
  /// so that a missing result can never masquerade as success.
  pub fn ok(value: Value) -> Result<Self, NullValue> {
    if value.is_null() {
      return Err(NullValue);
    }
    Ok(Outcome::Ok(value))
  }

  pub fn is_ok(&self) -> bool {
    matches!(self, Outcome::Ok(_))
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Outcome::Cancelled)
  }

  /// The success value, if any.
  pub fn value(&self) -> Option<&Value> {
    match self {
      Outcome::Ok(value) => Some(value),
      _ => None,
    }
  }

  /// Convert into the caller-facing result, re-raising failures.
  pub fn into_result(self) -> Result<Value, ExecuteError> {
    match self {
      Outcome::Ok(value) => Ok(value),
      Outcome::Error(error) => Err(error),
      Outcome::Cancelled => Err(ExecuteError::Cancelled),
    }
  }
}
