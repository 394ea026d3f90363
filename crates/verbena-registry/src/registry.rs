//! In-memory capability registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;
use verbena_capability::Capability;

use crate::error::RegistryError;

/// Observer of registry mutations.
///
/// Listeners are called synchronously from `register`/`unregister` with no
/// ordering guarantee across listeners; they must be fast and non-blocking,
/// deferring any real work to their own queues.
pub trait RegistryListener: Send + Sync {
  fn capability_registered(&self, capability: &Arc<Capability>);
  fn capability_unregistered(&self, id: &str);
}

/// Registry of capabilities, keyed by id.
#[derive(Default)]
pub struct CapabilityRegistry {
  capabilities: RwLock<HashMap<String, Arc<Capability>>>,
  listeners: Mutex<Vec<Arc<dyn RegistryListener>>>,
}

impl CapabilityRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a capability. Idempotent by id: a prior binding under the
  /// same id is replaced, which is how hot-reloaded capabilities are
  /// swapped in. Returns the replaced binding, if any.
  pub fn register(&self, capability: Arc<Capability>) -> Option<Arc<Capability>> {
    let replaced = {
      let mut capabilities = self.capabilities.write().unwrap();
      capabilities.insert(capability.id().to_string(), capability.clone())
    };
    debug!(
      capability = %capability.id(),
      replaced = replaced.is_some(),
      "capability registered"
    );
    for listener in self.listeners_snapshot() {
      listener.capability_registered(&capability);
    }
    replaced
  }

  /// Remove the binding for an id. Returns the removed capability, if any.
  pub fn unregister(&self, id: &str) -> Option<Arc<Capability>> {
    let removed = {
      let mut capabilities = self.capabilities.write().unwrap();
      capabilities.remove(id)
    };
    if removed.is_some() {
      debug!(capability = %id, "capability unregistered");
      for listener in self.listeners_snapshot() {
        listener.capability_unregistered(id);
      }
    }
    removed
  }

  /// Look up a capability by id.
  pub fn find(&self, id: &str) -> Result<Arc<Capability>, RegistryError> {
    let capabilities = self.capabilities.read().unwrap();
    capabilities
      .get(id)
      .cloned()
      .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
  }

  pub fn contains(&self, id: &str) -> bool {
    self.capabilities.read().unwrap().contains_key(id)
  }

  /// All registered capabilities matching a predicate.
  pub fn query<F>(&self, predicate: F) -> Vec<Arc<Capability>>
  where
    F: Fn(&Capability) -> bool,
  {
    let capabilities = self.capabilities.read().unwrap();
    capabilities
      .values()
      .filter(|capability| predicate(capability))
      .cloned()
      .collect()
  }

  /// Attach a change listener.
  pub fn subscribe(&self, listener: Arc<dyn RegistryListener>) {
    self.listeners.lock().unwrap().push(listener);
  }

  fn listeners_snapshot(&self) -> Vec<Arc<dyn RegistryListener>> {
    self.listeners.lock().unwrap().clone()
  }
}
