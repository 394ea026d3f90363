//! Resource-change events and invalidation listeners.

use std::sync::Arc;

use verbena_capability::InputHandle;

/// One external resource change, paired with the host-supplied predicate
/// deciding which inputs it invalidates. The engine never interprets the
/// resource itself.
#[derive(Clone)]
pub struct ChangeEvent {
  resource: String,
  conflicts: Arc<dyn Fn(&InputHandle) -> bool + Send + Sync>,
}

/// A batch of resource changes delivered together.
pub type ChangeBatch = Vec<ChangeEvent>;

impl ChangeEvent {
  pub fn new<F>(resource: impl Into<String>, conflicts: F) -> Self
  where
    F: Fn(&InputHandle) -> bool + Send + Sync + 'static,
  {
    Self {
      resource: resource.into(),
      conflicts: Arc::new(conflicts),
    }
  }

  /// Opaque identifier of the changed resource, for logging and listeners.
  pub fn resource(&self) -> &str {
    &self.resource
  }

  /// Whether the change invalidates the given input.
  pub fn conflicts_with(&self, input: &InputHandle) -> bool {
    (self.conflicts)(input)
  }
}

impl std::fmt::Debug for ChangeEvent {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChangeEvent")
      .field("resource", &self.resource)
      .finish_non_exhaustive()
  }
}

/// Observer of invalidations, e.g. a UI overlay dropping stale annotations.
///
/// Called synchronously from within change processing; implementations
/// must not block.
pub trait InvalidationListener: Send + Sync {
  fn on_invalidate(&self, invalidated: &[InputHandle], event: &ChangeEvent);
}
