//! Capability registry for verbena.
//!
//! Capabilities are registered by id and looked up either eagerly (static
//! pipeline binding) or at execution time (dynamic binding, tolerating
//! hot-reload). Registration is idempotent by id; re-registering replaces
//! the prior binding and notifies listeners so dependents can re-resolve.

mod error;
mod registry;

pub use error::RegistryError;
pub use registry::{CapabilityRegistry, RegistryListener};
