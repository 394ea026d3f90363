//! Identity-keyed input handles.
//!
//! Inputs frequently describe mutable resources (files, live objects) whose
//! value equality cannot be trusted as a cache key. Every handle therefore
//! carries a process-unique identity token assigned at creation; cache and
//! dedup keys compare by token only, never by payload.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

static NEXT_INPUT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token for an input. Two handles with equal payloads but
/// different tokens are distinct cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(u64);

impl std::fmt::Display for InputId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A cheaply cloneable handle to one input of a capability execution.
///
/// Equality and hashing go through the identity token.
#[derive(Debug, Clone)]
pub struct InputHandle {
  inner: Arc<InputInner>,
}

#[derive(Debug)]
struct InputInner {
  id: InputId,
  payload: Value,
}

impl InputHandle {
  /// Create a handle around a payload, assigning a fresh identity token.
  pub fn new(payload: Value) -> Self {
    let id = InputId(NEXT_INPUT_ID.fetch_add(1, Ordering::Relaxed));
    Self {
      inner: Arc::new(InputInner { id, payload }),
    }
  }

  pub fn id(&self) -> InputId {
    self.inner.id
  }

  pub fn payload(&self) -> &Value {
    &self.inner.payload
  }
}

impl PartialEq for InputHandle {
  fn eq(&self, other: &Self) -> bool {
    self.inner.id == other.inner.id
  }
}

impl Eq for InputHandle {}

impl std::hash::Hash for InputHandle {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.inner.id.hash(state);
  }
}
