//! Modification tags.
//!
//! Every mutated record is stamped with an `(epoch, index)` pair so that
//! downstream watchers can discard stale observations.

use serde::{Deserialize, Serialize};

/// Optimistic-concurrency tag stamped on mutable records.
///
/// The epoch changes when a record is recreated; the index increments on
/// every mutation within an epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationTag {
    /// Identifies the record's creation generation. Empty means unknown.
    pub epoch: String,
    /// Mutation counter within the epoch.
    pub index: u32,
}

impl ModificationTag {
    /// Creates a tag at the start of a new epoch.
    #[must_use]
    pub fn new(epoch: impl Into<String>) -> Self {
        Self {
            epoch: epoch.into(),
            index: 0,
        }
    }

    /// Reports whether `other` supersedes this tag.
    ///
    /// True when either epoch is unknown (empty), when the epochs differ,
    /// or when `other` is further along within the same epoch.
    #[must_use]
    pub fn succeeded_by(&self, other: &ModificationTag) -> bool {
        if self.epoch.is_empty() || other.epoch.is_empty() {
            return true;
        }
        self.epoch != other.epoch || self.index < other.index
    }

    /// Records a mutation.
    pub fn increment(&mut self) {
        self.index += 1;
    }
}
