//! The capability execution engine.
//!
//! # Architecture
//!
//! ```text
//! ExecutionEngine
//! ├── submit(capability, input, opts) -> Arc<Job>
//! │     cache hit    -> immediate job, completion delivered out-of-band
//! │     inflight hit -> listener attached to the shared job
//! │     miss         -> fresh job, registered inflight, runner spawned
//! ├── execute(capability, input) -> Result<Value, ExecuteError>
//! ├── invalidate(batch) -> evicts cache lines, cancels conflicting jobs
//! └── cancel_family(tag) -> bulk cancellation
//!
//! ChangeWorker
//! └── start(cancel) - drains a channel of change batches into invalidate()
//! ```
//!
//! The result cache and the dedup (inflight) table are the only shared
//! mutable state; one coarse lock guards both, held for bookkeeping
//! decisions only and never while a capability body runs.

mod config;
mod engine;
mod environment;
mod invalidation;
mod stats;
mod store;
mod worker;

pub use config::EngineConfig;
pub use engine::{ExecutionEngine, SubmitOptions, WeakEngine};
pub use environment::Environment;
pub use invalidation::{ChangeBatch, ChangeEvent, InvalidationListener};
pub use stats::StatsSnapshot;
pub use worker::{ChangeWorker, ChannelClosed};
