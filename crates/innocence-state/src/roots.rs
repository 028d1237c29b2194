//! Merkle root register.
//!
//! Owns the commitment tree and decides which roots a proof may be anchored to.

use std::collections::VecDeque;

use innocence_core::{Commitment, MerkleRoot};

use crate::error::StoreError;
use crate::merkle::IncrementalMerkleTree;

/// Which roots are accepted for balance and trade proofs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RootPolicy {
    /// Only the current root.
    #[default]
    CurrentOnly,
    /// The current root and the roots before it, `n` in total (`n >= 1`).
    Window(usize),
}

impl RootPolicy {
    /// Number of roots retained.
    pub fn retained(self) -> usize {
        match self {
            RootPolicy::CurrentOnly => 1,
            RootPolicy::Window(n) => n.max(1),
        }
    }
}

/// Tree plus the bounded history of its roots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootRegister {
    tree: IncrementalMerkleTree,
    history: VecDeque<MerkleRoot>,
    policy: RootPolicy,
}

impl RootRegister {
    /// Register over an empty protocol-depth tree.
    pub fn new(policy: RootPolicy) -> Self {
        Self::with_tree(IncrementalMerkleTree::new(), policy)
    }

    /// Register over an existing tree; only its current root is known.
    pub fn with_tree(tree: IncrementalMerkleTree, policy: RootPolicy) -> Self {
        let mut history = VecDeque::with_capacity(policy.retained());
        history.push_back(tree.root());
        Self {
            tree,
            history,
            policy,
        }
    }

    /// Current root (`getMerkleRoot`).
    pub fn current_root(&self) -> MerkleRoot {
        self.tree.root()
    }

    /// Whether a proof anchored to `root` is accepted.
    pub fn is_accepted(&self, root: &MerkleRoot) -> bool {
        self.history.contains(root)
    }

    /// Append a commitment, rotate the root history, return the leaf index.
    pub fn insert(&mut self, cm: &Commitment) -> Result<u64, StoreError> {
        let index = self.tree.append(cm)?;
        self.history.push_back(self.tree.root());
        while self.history.len() > self.policy.retained() {
            self.history.pop_front();
        }
        Ok(index)
    }

    /// Underlying tree.
    pub fn tree(&self) -> &IncrementalMerkleTree {
        &self.tree
    }

    /// Root acceptance policy.
    pub fn policy(&self) -> RootPolicy {
        self.policy
    }

    /// Accepted roots, oldest first.
    pub fn accepted_roots(&self) -> impl Iterator<Item = &MerkleRoot> {
        self.history.iter()
    }
}
