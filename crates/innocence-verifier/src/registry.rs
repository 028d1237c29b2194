//! Registry verifier for devnets and tests.
//!
//! Accepts a proof iff `keccak256(vkey || public_values || proof)` has been
//! registered, or the verifier is in always-valid mode. Production deployments
//! plug a real SP1 verifier in behind [`ProofVerifier`] instead.

use hashbrown::HashSet;
use innocence_core::Hash32;
use sha3::{Digest, Keccak256};

use crate::keys::VerificationKey;
use crate::verifier::ProofVerifier;

/// Mock verifier backed by a set of registered proof digests.
#[derive(Clone, Debug, Default)]
pub struct RegistryVerifier {
    valid: HashSet<Hash32>,
    always_valid: bool,
}

impl RegistryVerifier {
    /// Empty registry that rejects everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that accepts every proof.
    pub fn always_valid() -> Self {
        Self {
            valid: HashSet::new(),
            always_valid: true,
        }
    }

    /// Digest identifying a (key, public values, proof) triple.
    pub fn digest(vkey: &VerificationKey, public_values: &[u8], proof: &[u8]) -> Hash32 {
        let mut hasher = Keccak256::new();
        hasher.update(vkey.0.as_bytes());
        hasher.update(public_values);
        hasher.update(proof);
        Hash32(hasher.finalize().into())
    }

    /// Register a digest as valid. Returns `false` if it was already present.
    pub fn register_digest(&mut self, digest: Hash32) -> bool {
        self.valid.insert(digest)
    }

    /// Register a proof as valid. Returns its digest.
    pub fn register_valid_proof(
        &mut self,
        vkey: &VerificationKey,
        public_values: &[u8],
        proof: &[u8],
    ) -> Hash32 {
        let digest = Self::digest(vkey, public_values, proof);
        self.valid.insert(digest);
        digest
    }

    /// Toggle always-valid mode.
    pub fn set_always_valid(&mut self, on: bool) {
        self.always_valid = on;
    }

    /// Whether always-valid mode is on.
    pub fn is_always_valid(&self) -> bool {
        self.always_valid
    }

    /// Number of registered digests.
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    /// Whether no digests are registered.
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }
}

impl ProofVerifier for RegistryVerifier {
    fn verify(&self, proof: &[u8], public_values: &[u8], vkey: &VerificationKey) -> bool {
        self.always_valid || self.valid.contains(&Self::digest(vkey, public_values, proof))
    }
}
