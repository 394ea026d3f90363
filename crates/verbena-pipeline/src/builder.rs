//! Pipeline construction.

use std::sync::Arc;

use verbena_capability::{Capability, CapabilityFlags, ValueType};
use verbena_engine::ExecutionEngine;

use crate::StageRef;
use crate::error::PipelineError;
use crate::run::PipelineBody;

/// Builder for a pipeline capability.
///
/// `build_static` resolves every stage id against the engine's registry up
/// front and fails fast on anything unresolved or type-incompatible.
/// `build_dynamic` keeps string ids and re-resolves them at every run,
/// tolerating hot-reload; an id that fails to resolve then surfaces as an
/// unresolved-capability error in the run's outcome, never as a build
/// failure.
pub struct PipelineBuilder {
  id: String,
  name: String,
  stages: Vec<StageRef>,
}

impl PipelineBuilder {
  pub(crate) fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      stages: Vec::new(),
    }
  }

  /// Append a stage bound to a resolved capability.
  pub fn stage(mut self, capability: Arc<Capability>) -> Self {
    self.stages.push(StageRef::Resolved(capability));
    self
  }

  /// Append a stage bound by id, to be resolved per run.
  pub fn stage_id(mut self, id: impl Into<String>) -> Self {
    self.stages.push(StageRef::Named(id.into()));
    self
  }

  /// Build with static binding: every stage is resolved now and pinned.
  pub fn build_static(self, engine: &ExecutionEngine) -> Result<Arc<Capability>, PipelineError> {
    if self.stages.is_empty() {
      return Err(PipelineError::Empty { id: self.id });
    }

    let mut resolved = Vec::with_capacity(self.stages.len());
    for stage in &self.stages {
      match stage {
        StageRef::Resolved(capability) => resolved.push(capability.clone()),
        StageRef::Named(stage_id) => match engine.registry().find(stage_id) {
          Ok(capability) => resolved.push(capability),
          Err(_) => {
            return Err(PipelineError::UnresolvedStage {
              id: self.id,
              stage: stage_id.clone(),
            });
          }
        },
      }
    }

    for (index, pair) in resolved.windows(2).enumerate() {
      let produced = pair[0].return_type();
      let expected = pair[1].param_type();
      if !expected.compatible(produced) {
        return Err(PipelineError::StageTypeMismatch {
          id: self.id,
          index: index + 1,
          expected,
          actual: produced,
        });
      }
    }

    let flags = derive_flags(resolved.iter().map(|c| Some(c.flags())));
    let param_type = resolved[0].param_type();
    let return_type = resolved[resolved.len() - 1].return_type();
    let stages = resolved.into_iter().map(StageRef::Resolved).collect();
    Ok(self.finish(engine, stages, flags, param_type, return_type))
  }

  /// Build with dynamic binding: named stages stay ids.
  pub fn build_dynamic(self, engine: &ExecutionEngine) -> Result<Arc<Capability>, PipelineError> {
    if self.stages.is_empty() {
      return Err(PipelineError::Empty { id: self.id });
    }

    // Derive metadata from whatever resolves right now; unresolved stages
    // contribute conservatively (impure, transient, untyped).
    let flags = derive_flags(self.stages.iter().map(|stage| match stage {
      StageRef::Resolved(capability) => Some(capability.flags()),
      StageRef::Named(stage_id) => engine
        .registry()
        .find(stage_id)
        .ok()
        .map(|capability| capability.flags()),
    }));
    let param_type = match &self.stages[0] {
      StageRef::Resolved(capability) => capability.param_type(),
      StageRef::Named(stage_id) => engine
        .registry()
        .find(stage_id)
        .map(|capability| capability.param_type())
        .unwrap_or(ValueType::Any),
    };
    let return_type = match &self.stages[self.stages.len() - 1] {
      StageRef::Resolved(capability) => capability.return_type(),
      StageRef::Named(stage_id) => engine
        .registry()
        .find(stage_id)
        .map(|capability| capability.return_type())
        .unwrap_or(ValueType::Any),
    };

    let stages = self.stages.clone();
    Ok(self.finish(engine, stages, flags, param_type, return_type))
  }

  fn finish(
    self,
    engine: &ExecutionEngine,
    stages: Vec<StageRef>,
    flags: CapabilityFlags,
    param_type: ValueType,
    return_type: ValueType,
  ) -> Arc<Capability> {
    let body = PipelineBody::new(self.id.clone(), engine.downgrade(), stages);
    Capability::builder(self.id, self.name)
      .param_type(param_type)
      .return_type(return_type)
      .flags(flags)
      .build(Arc::new(body))
  }
}

/// Pipeline flags derive from the components: pure iff all components are
/// pure, transient if any component is transient, local iff all are local.
/// `None` stands for a component that could not be resolved yet.
fn derive_flags<I>(components: I) -> CapabilityFlags
where
  I: Iterator<Item = Option<CapabilityFlags>>,
{
  let mut flags = CapabilityFlags {
    pure: true,
    local: true,
    transient: false,
  };
  for component in components {
    match component {
      Some(component) => {
        flags.pure &= component.pure;
        flags.local &= component.local;
        flags.transient |= component.transient;
      }
      None => {
        flags.pure = false;
        flags.transient = true;
      }
    }
  }
  flags
}
