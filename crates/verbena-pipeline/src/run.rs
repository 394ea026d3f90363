//! Pipeline execution.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use verbena_capability::{Capability, CapabilityBody, ExecuteError, InputHandle, Outcome};
use verbena_engine::{SubmitOptions, WeakEngine};
use verbena_job::FamilyTag;

use crate::StageRef;

/// The body of a pipeline capability.
///
/// Holds a non-owning engine reference; pipelines live in the engine's
/// registry, so an owning reference would cycle.
pub(crate) struct PipelineBody {
  pipeline_id: String,
  engine: WeakEngine,
  stages: Vec<StageRef>,
}

impl PipelineBody {
  pub(crate) fn new(pipeline_id: String, engine: WeakEngine, stages: Vec<StageRef>) -> Self {
    Self {
      pipeline_id,
      engine,
      stages,
    }
  }
}

#[async_trait]
impl CapabilityBody for PipelineBody {
  #[instrument(
    name = "pipeline_execute",
    skip(self, input, cancel),
    fields(pipeline = %self.pipeline_id, input = %input.id())
  )]
  async fn run(
    &self,
    input: &InputHandle,
    cancel: &CancellationToken,
  ) -> Result<Value, ExecuteError> {
    let engine = self.engine.upgrade().ok_or_else(|| ExecuteError::Malformed {
      id: self.pipeline_id.clone(),
      message: "execution engine is gone".to_string(),
    })?;

    // Pin the component set for this run: dynamic stages resolve once at
    // job start, so a hot-swap mid-run cannot mix component versions.
    let mut components = Vec::with_capacity(self.stages.len());
    for stage in &self.stages {
      let component: std::sync::Arc<Capability> = match stage {
        StageRef::Resolved(capability) => capability.clone(),
        StageRef::Named(stage_id) => engine
          .registry()
          .find(stage_id)
          .map_err(|_| ExecuteError::Unresolved {
            id: stage_id.clone(),
          })?,
      };
      components.push(component);
    }

    let mut current = input.clone();
    let mut output = Value::Null;
    for (index, component) in components.iter().enumerate() {
      // Cancellation is checked between stages, not within one.
      if cancel.is_cancelled() {
        return Err(ExecuteError::Cancelled);
      }

      debug!(stage = index, component = %component.id(), "running pipeline stage");
      let job = engine.submit(
        component,
        &current,
        SubmitOptions::new()
          .family(FamilyTag::Named(self.pipeline_id.clone()))
          .parent_cancel(cancel.clone()),
      );
      match job.wait().await {
        Outcome::Ok(value) => {
          // Each intermediate value becomes the next stage's input under
          // a fresh identity.
          current = InputHandle::new(value.clone());
          output = value;
        }
        // Fail fast with the failing stage's exact outcome; later stages
        // never run.
        Outcome::Error(error) => return Err(error),
        Outcome::Cancelled => return Err(ExecuteError::Cancelled),
      }
    }

    Ok(output)
  }
}
