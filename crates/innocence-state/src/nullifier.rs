//! Nullifier set.
//!
//! Append-only: a nullifier hash is inserted exactly once, when its note is
//! spent, and never removed. The node mirrors inserts into sled with a
//! compare-and-swap so the check-and-set stays atomic on disk as well.

use hashbrown::HashSet;

use innocence_core::Nullifier;

use crate::error::StoreError;

/// In-memory set of spent nullifier hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NullifierSet {
    set: HashSet<Nullifier>,
}

impl NullifierSet {
    /// Create a new empty nullifier set.
    pub fn new() -> Self {
        Self {
            set: HashSet::new(),
        }
    }

    /// Returns `true` if the nullifier has already been spent.
    pub fn contains(&self, nf: &Nullifier) -> bool {
        self.set.contains(nf)
    }

    /// Mark a nullifier spent.
    pub fn insert(&mut self, nf: Nullifier) -> Result<(), StoreError> {
        if self.set.insert(nf) {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists)
        }
    }

    /// Number of spent nullifiers tracked.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Iterate spent nullifiers in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Nullifier> {
        self.set.iter()
    }
}
