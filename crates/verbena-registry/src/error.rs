//! Registry errors.

/// Errors that can occur during registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
  /// No capability is registered under the given id.
  #[error("capability '{id}' is not registered")]
  NotFound { id: String },
}
