//! Consumed notes and trade claims.
//!
//! A balance proof says nothing about the nullifier supplied next to it, so
//! the nullifier set alone cannot stop one proof from paying out twice. The
//! pool therefore also records the commitment each withdrawal spent, and the
//! digest of every trade claim it settled. Both are insert-once and are
//! mirrored to disk with the same check-and-set as nullifiers.

use core::hash::Hash;

use hashbrown::HashSet;

use innocence_core::{Commitment, Hash32};

use crate::error::StoreError;

/// Insert-once set of consumed keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumedSet<K: Eq + Hash> {
    set: HashSet<K>,
}

impl<K: Eq + Hash> Default for ConsumedSet<K> {
    fn default() -> Self {
        Self {
            set: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash> ConsumedSet<K> {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` was consumed.
    pub fn contains(&self, key: &K) -> bool {
        self.set.contains(key)
    }

    /// Consume `key`.
    pub fn insert(&mut self, key: K) -> Result<(), StoreError> {
        if self.set.insert(key) {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists)
        }
    }

    /// Number of consumed keys.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether nothing was consumed yet.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Commitments whose value was withdrawn.
pub type SpentNoteSet = ConsumedSet<Commitment>;

/// Digests of settled trade claims.
pub type TradeDigestSet = ConsumedSet<Hash32>;
