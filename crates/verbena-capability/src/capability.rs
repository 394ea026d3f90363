//! Capability descriptors.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ExecuteError;
use crate::input::InputHandle;
use crate::value_type::ValueType;

/// Behavior flags of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
  /// The computation has no side effects and needs no environment setup.
  pub pure: bool,
  /// The computation runs in-process rather than against a remote service.
  pub local: bool,
  /// Results depend on live external state and must never be cached.
  pub transient: bool,
}

impl Default for CapabilityFlags {
  fn default() -> Self {
    Self {
      pure: false,
      local: true,
      transient: false,
    }
  }
}

/// The computation behind a capability.
///
/// Cancellation is cooperative: a well-behaved body polls `cancel` at
/// sub-task boundaries and returns `Err(ExecuteError::Cancelled)` promptly.
#[async_trait]
pub trait CapabilityBody: Send + Sync {
  async fn run(
    &self,
    input: &InputHandle,
    cancel: &CancellationToken,
  ) -> Result<Value, ExecuteError>;
}

/// A named, typed, potentially impure computation.
///
/// Immutable once constructed; identity is the `id`, so two instances with
/// the same id share cache and dedup entries.
pub struct Capability {
  id: String,
  name: String,
  param_type: ValueType,
  return_type: ValueType,
  flags: CapabilityFlags,
  body: Arc<dyn CapabilityBody>,
}

impl Capability {
  pub fn builder(id: impl Into<String>, name: impl Into<String>) -> CapabilityBuilder {
    CapabilityBuilder {
      id: id.into(),
      name: name.into(),
      param_type: ValueType::Any,
      return_type: ValueType::Any,
      flags: CapabilityFlags::default(),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn param_type(&self) -> ValueType {
    self.param_type
  }

  pub fn return_type(&self) -> ValueType {
    self.return_type
  }

  pub fn flags(&self) -> CapabilityFlags {
    self.flags
  }

  pub fn body(&self) -> &Arc<dyn CapabilityBody> {
    &self.body
  }
}

impl std::fmt::Debug for Capability {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Capability")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("param_type", &self.param_type)
      .field("return_type", &self.return_type)
      .field("flags", &self.flags)
      .finish_non_exhaustive()
  }
}

/// Builder for [`Capability`]. Defaults: `Any` parameter and return types,
/// impure, local, non-transient.
pub struct CapabilityBuilder {
  id: String,
  name: String,
  param_type: ValueType,
  return_type: ValueType,
  flags: CapabilityFlags,
}

impl CapabilityBuilder {
  pub fn param_type(mut self, param_type: ValueType) -> Self {
    self.param_type = param_type;
    self
  }

  pub fn return_type(mut self, return_type: ValueType) -> Self {
    self.return_type = return_type;
    self
  }

  pub fn pure(mut self, pure: bool) -> Self {
    self.flags.pure = pure;
    self
  }

  pub fn local(mut self, local: bool) -> Self {
    self.flags.local = local;
    self
  }

  pub fn transient(mut self, transient: bool) -> Self {
    self.flags.transient = transient;
    self
  }

  pub fn flags(mut self, flags: CapabilityFlags) -> Self {
    self.flags = flags;
    self
  }

  /// Finish the descriptor around the given computation.
  pub fn build(self, body: Arc<dyn CapabilityBody>) -> Arc<Capability> {
    Arc::new(Capability {
      id: self.id,
      name: self.name,
      param_type: self.param_type,
      return_type: self.return_type,
      flags: self.flags,
      body,
    })
  }

  /// Finish the descriptor around a synchronous function body.
  pub fn build_fn<F>(self, body: F) -> Arc<Capability>
  where
    F: Fn(&InputHandle) -> Result<Value, ExecuteError> + Send + Sync + 'static,
  {
    self.build(from_fn(body))
  }
}

struct FnBody<F>(F);

#[async_trait]
impl<F> CapabilityBody for FnBody<F>
where
  F: Fn(&InputHandle) -> Result<Value, ExecuteError> + Send + Sync + 'static,
{
  async fn run(
    &self,
    input: &InputHandle,
    _cancel: &CancellationToken,
  ) -> Result<Value, ExecuteError> {
    (self.0)(input)
  }
}

/// Wrap a synchronous function as a capability body. Bodies that need to
/// observe cancellation mid-run should implement [`CapabilityBody`] instead.
pub fn from_fn<F>(body: F) -> Arc<dyn CapabilityBody>
where
  F: Fn(&InputHandle) -> Result<Value, ExecuteError> + Send + Sync + 'static,
{
  Arc::new(FnBody(body))
}
