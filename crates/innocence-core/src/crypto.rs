// Wire-visible. Must match the hashing done inside the proving circuits.
//! Note hashing shared with the circuits.
//!
//! This crate does NOT implement novel cryptography. All three helpers are
//! plain SHA-256 over fixed-length inputs so that the values computed here are
//! bit-identical to the ones the balance, compliance and trade circuits commit to.

use crate::constants::*;
use crate::types::{Commitment, Hash32, Nullifier};
use sha2::{Digest, Sha256};

fn sha256_concat(parts: &[&[u8]]) -> [u8; HASH32_LEN] {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

/// Note commitment: `SHA256(secret || nullifier)`.
pub fn compute_commitment(secret: &[u8; 32], nullifier: &[u8; 32]) -> Commitment {
    Commitment(sha256_concat(&[secret, nullifier]))
}

/// Nullifier hash revealed at spend time: `SHA256(nullifier)`.
pub fn nullifier_hash(nullifier: &[u8; 32]) -> Nullifier {
    Nullifier(sha256_concat(&[nullifier]))
}

/// Interior Merkle node: `SHA256(left || right)`.
pub fn merkle_node(left: &Hash32, right: &Hash32) -> Hash32 {
    Hash32(sha256_concat(&[left.as_bytes(), right.as_bytes()]))
}
