//! Commitment store.

use hashbrown::HashMap;

use innocence_core::Commitment;

use crate::error::StoreError;

/// Recorded commitments in insertion order, with a reverse index.
///
/// Position `i` in the store is leaf `i` of the commitment tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitmentSet {
    leaves: Vec<Commitment>,
    index: HashMap<Commitment, u64>,
}

impl CommitmentSet {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the commitment has been recorded.
    pub fn contains(&self, cm: &Commitment) -> bool {
        self.index.contains_key(cm)
    }

    /// Leaf index of a recorded commitment.
    pub fn index_of(&self, cm: &Commitment) -> Option<u64> {
        self.index.get(cm).copied()
    }

    /// Record a commitment and return its leaf index.
    pub fn insert(&mut self, cm: Commitment) -> Result<u64, StoreError> {
        if self.index.contains_key(&cm) {
            return Err(StoreError::AlreadyExists);
        }
        let idx = self.leaves.len() as u64;
        self.leaves.push(cm);
        self.index.insert(cm, idx);
        Ok(idx)
    }

    /// Commitments in leaf order.
    pub fn leaves(&self) -> &[Commitment] {
        &self.leaves
    }

    /// Number of recorded commitments.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}
