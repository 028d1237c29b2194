//! Fixed-depth incremental Merkle tree over commitments.
//!
//! Leaves are raw commitment bytes; interior nodes are `SHA256(left || right)`
//! and empty subtrees hash up from an all-zero leaf. Only the left-hand
//! frontier (`filled`) is kept, which gives O(depth) append and O(1) root.
//!
//! Authentication paths for clients are recomputed from the leaf list on demand.

use innocence_core::{merkle_node, Commitment, Hash32, COMMITMENT_TREE_DEPTH};

use crate::error::StoreError;

/// Root of the empty subtree at each height, `zeros[0]` being the empty leaf.
fn zero_hashes(depth: usize) -> Vec<Hash32> {
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(Hash32::zero());
    for h in 0..depth {
        let z = zeros[h];
        zeros.push(merkle_node(&z, &z));
    }
    zeros
}

/// Append-only Merkle tree of fixed depth.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncrementalMerkleTree {
    depth: usize,
    next_index: u64,
    filled: Vec<Hash32>,
    zeros: Vec<Hash32>,
    root: Hash32,
}

impl IncrementalMerkleTree {
    /// Empty tree of the protocol depth.
    pub fn new() -> Self {
        Self::with_depth(COMMITMENT_TREE_DEPTH)
    }

    /// Empty tree of the given depth (tests use small depths).
    pub fn with_depth(depth: usize) -> Self {
        let zeros = zero_hashes(depth);
        let root = zeros[depth];
        Self {
            depth,
            next_index: 0,
            filled: zeros[..depth].to_vec(),
            zeros,
            root,
        }
    }

    /// Tree depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of leaves appended.
    pub fn len(&self) -> u64 {
        self.next_index
    }

    /// Whether no leaves were appended.
    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    /// Maximum number of leaves.
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Current root.
    pub fn root(&self) -> Hash32 {
        self.root
    }

    /// Root the tree would have after appending `leaf`, without mutating.
    pub fn root_after(&self, leaf: &Commitment) -> Result<Hash32, StoreError> {
        let mut tmp = self.clone();
        tmp.append(leaf)?;
        Ok(tmp.root)
    }

    /// Append a leaf and return its index.
    pub fn append(&mut self, leaf: &Commitment) -> Result<u64, StoreError> {
        if self.next_index >= self.capacity() {
            return Err(StoreError::TreeFull);
        }
        let index = self.next_index;
        let mut idx = index;
        let mut node = Hash32(leaf.0);
        for h in 0..self.depth {
            let (left, right) = if idx & 1 == 0 {
                self.filled[h] = node;
                (node, self.zeros[h])
            } else {
                (self.filled[h], node)
            };
            node = merkle_node(&left, &right);
            idx >>= 1;
        }
        self.root = node;
        self.next_index += 1;
        Ok(index)
    }

    /// Authentication path for leaf `index` given every leaf in order.
    pub fn path(&self, leaves: &[Commitment], index: u64) -> Option<MerklePath> {
        authentication_path(self.depth, leaves, index)
    }
}

impl Default for IncrementalMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Sibling hashes from a leaf up to the root.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MerklePath {
    /// Index of the leaf.
    pub leaf_index: u64,
    /// Siblings, leaf level first.
    pub siblings: Vec<Hash32>,
}

impl MerklePath {
    /// Root obtained by hashing `leaf` up the path.
    pub fn compute_root(&self, leaf: &Commitment) -> Hash32 {
        let mut node = Hash32(leaf.0);
        let mut idx = self.leaf_index;
        for sib in &self.siblings {
            node = if idx & 1 == 0 {
                merkle_node(&node, sib)
            } else {
                merkle_node(sib, &node)
            };
            idx >>= 1;
        }
        node
    }

    /// Whether the path proves `leaf` under `root`.
    pub fn verify(&self, leaf: &Commitment, root: &Hash32) -> bool {
        &self.compute_root(leaf) == root
    }
}

/// Authentication path of `leaves[index]` in a depth-`depth` tree.
pub fn authentication_path(depth: usize, leaves: &[Commitment], index: u64) -> Option<MerklePath> {
    if index >= leaves.len() as u64 {
        return None;
    }
    let zeros = zero_hashes(depth);
    let mut level: Vec<Hash32> = leaves.iter().map(|c| Hash32(c.0)).collect();
    let mut idx = index as usize;
    let mut siblings = Vec::with_capacity(depth);
    for zero in zeros.iter().take(depth) {
        let sib = level.get(idx ^ 1).copied().unwrap_or(*zero);
        siblings.push(sib);
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [l, r] => merkle_node(l, r),
                [l] => merkle_node(l, zero),
                _ => *zero,
            })
            .collect();
        idx >>= 1;
    }
    Some(MerklePath {
        leaf_index: index,
        siblings,
    })
}
