//! Capability descriptors and the value model for verbena.
//!
//! A [`Capability`] is a named, typed, potentially impure computation. This
//! crate holds the immutable descriptor, the [`CapabilityBody`] trait its
//! computation implements, identity-keyed [`InputHandle`]s, and the
//! [`Outcome`] a finished execution produces. The execution engine itself
//! lives in `verbena-engine`.

mod capability;
mod error;
mod input;
mod outcome;
mod value_type;

pub use capability::{Capability, CapabilityBody, CapabilityBuilder, CapabilityFlags, from_fn};
pub use error::ExecuteError;
pub use input::{InputHandle, InputId};
pub use outcome::{NullValue, Outcome};
pub use value_type::ValueType;
