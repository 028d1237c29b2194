//! Verification keys, one per proof kind.

use core::fmt;
use core::str::FromStr;

use innocence_core::{CoreError, Hash32};

use crate::kind::ProofKind;

/// Verification key identifying a circuit (SP1 program vkey hash).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VerificationKey(pub Hash32);

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VerificationKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(VerificationKey)
    }
}

/// The pool's verification keys.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VerifyingKeys {
    /// Key of the compliance circuit.
    pub compliance: VerificationKey,
    /// Key of the balance circuit.
    pub balance: VerificationKey,
    /// Key of the trade circuit.
    pub trade: VerificationKey,
    /// Key of the ownership circuit.
    pub ownership: VerificationKey,
}

impl VerifyingKeys {
    /// Key used for proofs of `kind`.
    pub fn for_kind(&self, kind: ProofKind) -> &VerificationKey {
        match kind {
            ProofKind::Compliance => &self.compliance,
            ProofKind::Balance => &self.balance,
            ProofKind::Trade => &self.trade,
            ProofKind::Ownership => &self.ownership,
        }
    }

    /// Distinct devnet keys derived from the kind names.
    pub fn devnet() -> Self {
        let key = |kind: ProofKind| {
            VerificationKey(innocence_core::hash32(b"INNOCENCE::DEVNET_VKEY::V0", kind.name().as_bytes()))
        };
        Self {
            compliance: key(ProofKind::Compliance),
            balance: key(ProofKind::Balance),
            trade: key(ProofKind::Trade),
            ownership: key(ProofKind::Ownership),
        }
    }
}
