//! The external verifier seam.

use crate::keys::VerificationKey;

/// Zero-knowledge proof verifier.
///
/// Implementations must not assume anything about the layout of `public_values`;
/// decoding and binding is done by [`crate::ProofGate`].
pub trait ProofVerifier {
    /// Returns `true` iff `proof` is valid for `public_values` under `vkey`.
    fn verify(&self, proof: &[u8], public_values: &[u8], vkey: &VerificationKey) -> bool;
}

impl<V: ProofVerifier + ?Sized> ProofVerifier for Box<V> {
    fn verify(&self, proof: &[u8], public_values: &[u8], vkey: &VerificationKey) -> bool {
        (**self).verify(proof, public_values, vkey)
    }
}
