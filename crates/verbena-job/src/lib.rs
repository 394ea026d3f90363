//! The job abstraction for verbena.
//!
//! A [`Job`] is one scheduled execution attempt of a capability against one
//! input: a cancellable unit of asynchronous work producing a terminal
//! [`verbena_capability::Outcome`]. Jobs move monotonically through
//! `Created → Scheduled → Running → Done`; completion fires every attached
//! listener exactly once, and listeners attached after completion get the
//! terminal outcome replayed synchronously.

mod family;
mod job;

pub use family::FamilyTag;
pub use job::{FamiliesSealed, Job, JobState, OnDone};
