//! Verify, decode, bind.
//!
//! Every accepted proof goes through the same three steps, in order:
//! 1. the proof fits the size bound, the public values have a length the kind
//!    decodes, and the verifier accepts `(proof, public_values)` under the key for the kind
//! 2. the public values decode to the fixed ABI layout of the kind
//! 3. values that duplicate a call argument equal that argument
//!
//! Checks against pool state (known commitments, roots, balances) are left to
//! the caller.

use innocence_core::{
    BalancePublicValues, Commitment, CompliancePublicValues, CoreError, OwnershipPublicValues,
    TradePublicValues, MAX_PROOF_BYTES,
};
use tracing::debug;

use crate::error::GateError;
use crate::keys::VerifyingKeys;
use crate::kind::ProofKind;
use crate::verifier::ProofVerifier;

/// Proof gate over a verifier and the pool's verification keys.
#[derive(Clone, Debug)]
pub struct ProofGate<V> {
    verifier: V,
    keys: VerifyingKeys,
}

impl<V: ProofVerifier> ProofGate<V> {
    /// Create a gate.
    pub fn new(verifier: V, keys: VerifyingKeys) -> Self {
        Self { verifier, keys }
    }

    /// Verification keys in use.
    pub fn keys(&self) -> &VerifyingKeys {
        &self.keys
    }

    /// Underlying verifier.
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Mutable access to the verifier (registering proofs on devnets).
    pub fn verifier_mut(&mut self) -> &mut V {
        &mut self.verifier
    }

    /// Step 1: size bound and public-values length, then the verifier.
    pub fn verify(&self, kind: ProofKind, proof: &[u8], public_values: &[u8]) -> Result<(), GateError> {
        if proof.len() > MAX_PROOF_BYTES {
            return Err(GateError::ProofTooLarge {
                kind,
                got: proof.len(),
                limit: MAX_PROOF_BYTES,
            });
        }
        if !kind.accepts_len(public_values.len()) {
            return Err(GateError::Malformed {
                kind,
                source: CoreError::PublicValuesLength {
                    kind: kind.name(),
                    expected: kind.public_values_lens(),
                    got: public_values.len(),
                },
            });
        }
        if !self
            .verifier
            .verify(proof, public_values, self.keys.for_kind(kind))
        {
            debug!(kind = kind.name(), "verifier rejected proof");
            return Err(GateError::Rejected { kind });
        }
        Ok(())
    }

    /// Compliance proof bound to the commitment being deposited.
    pub fn compliance(
        &self,
        commitment: &Commitment,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<CompliancePublicValues, GateError> {
        let kind = ProofKind::Compliance;
        self.verify(kind, proof, public_values)?;
        let pv = CompliancePublicValues::decode(public_values).map_err(malformed(kind))?;
        bind(kind, "commitment", &pv.commitment == commitment)?;
        Ok(pv)
    }

    /// Balance proof. The caller binds the commitment to pool state.
    pub fn balance(&self, proof: &[u8], public_values: &[u8]) -> Result<BalancePublicValues, GateError> {
        let kind = ProofKind::Balance;
        self.verify(kind, proof, public_values)?;
        BalancePublicValues::decode(public_values).map_err(malformed(kind))
    }

    /// Trade proof. The caller binds the commitment to pool state.
    pub fn trade(&self, proof: &[u8], public_values: &[u8]) -> Result<TradePublicValues, GateError> {
        let kind = ProofKind::Trade;
        self.verify(kind, proof, public_values)?;
        TradePublicValues::decode(public_values).map_err(malformed(kind))
    }

    /// Ownership proof bound to the attested commitment.
    pub fn ownership(
        &self,
        commitment: &Commitment,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<OwnershipPublicValues, GateError> {
        let kind = ProofKind::Ownership;
        self.verify(kind, proof, public_values)?;
        let pv = OwnershipPublicValues::decode(public_values).map_err(malformed(kind))?;
        bind(kind, "commitment", &pv.commitment == commitment)?;
        Ok(pv)
    }
}

fn malformed(kind: ProofKind) -> impl FnOnce(CoreError) -> GateError {
    move |source| GateError::Malformed { kind, source }
}

fn bind(kind: ProofKind, field: &'static str, matches: bool) -> Result<(), GateError> {
    if matches {
        Ok(())
    } else {
        Err(GateError::Mismatch { kind, field })
    }
}
