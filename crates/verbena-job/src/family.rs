//! Job families.

use verbena_capability::InputId;

/// A tag grouping related jobs for bulk cancellation.
///
/// Every job the engine creates belongs to the global family, its input's
/// family and its capability's family; callers may add one named family of
/// their own before the job is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FamilyTag {
  /// Every job.
  Global,
  /// All jobs executing against one input.
  Input(InputId),
  /// All jobs of one capability.
  Capability(String),
  /// A caller-defined grouping.
  Named(String),
}
