//! Pipeline composition for verbena.
//!
//! A pipeline is itself a [`verbena_capability::Capability`] whose body
//! executes component capabilities left-to-right, feeding each stage's
//! value into the next stage. Stages can be bound statically (resolved at
//! construction) or dynamically (string ids re-resolved per run, tolerating
//! hot-reload of the underlying capabilities).

mod builder;
mod error;
mod run;

pub use builder::PipelineBuilder;
pub use error::PipelineError;

use verbena_capability::Capability;

/// Entry point for composing a pipeline capability.
pub struct Pipeline;

impl Pipeline {
  pub fn builder(
    id: impl Into<String>,
    name: impl Into<String>,
  ) -> PipelineBuilder {
    PipelineBuilder::new(id, name)
  }
}

/// One component reference inside a pipeline.
#[derive(Clone)]
pub(crate) enum StageRef {
  /// A capability pinned at construction time.
  Resolved(std::sync::Arc<Capability>),
  /// An id resolved against the registry at every run.
  Named(String),
}
