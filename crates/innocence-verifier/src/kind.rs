//! Closed set of proof kinds.

use core::fmt;
use core::str::FromStr;

use innocence_core::{
    CoreError, ANCHORED_TRADE_PUBLIC_VALUES_LEN, BALANCE_PUBLIC_VALUES_LEN,
    COMPLIANCE_PUBLIC_VALUES_LEN, OWNERSHIP_PUBLIC_VALUES_LEN, TRADE_PUBLIC_VALUES_LEN,
};

/// Kind of zero-knowledge proof accepted by the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProofKind {
    /// Depositor passed the compliance check.
    Compliance,
    /// Note holds at least a minimum balance as of a root.
    Balance,
    /// Note has enough balance to perform a trade.
    Trade,
    /// Prover knows the secrets behind a commitment.
    Ownership,
}

impl ProofKind {
    /// All kinds, in a fixed order.
    pub const ALL: [ProofKind; 4] = [
        ProofKind::Compliance,
        ProofKind::Balance,
        ProofKind::Trade,
        ProofKind::Ownership,
    ];

    /// Lowercase name, as used on the RPC surface and in logs.
    pub fn name(self) -> &'static str {
        match self {
            ProofKind::Compliance => "compliance",
            ProofKind::Balance => "balance",
            ProofKind::Trade => "trade",
            ProofKind::Ownership => "ownership",
        }
    }

    /// Encoded public-values lengths this kind decodes.
    pub fn public_values_lens(self) -> &'static [usize] {
        match self {
            ProofKind::Compliance => &[COMPLIANCE_PUBLIC_VALUES_LEN],
            ProofKind::Balance => &[BALANCE_PUBLIC_VALUES_LEN],
            ProofKind::Trade => &[TRADE_PUBLIC_VALUES_LEN, ANCHORED_TRADE_PUBLIC_VALUES_LEN],
            ProofKind::Ownership => &[OWNERSHIP_PUBLIC_VALUES_LEN],
        }
    }

    /// Whether `len` is a valid encoded public-values length for this kind.
    pub fn accepts_len(self, len: usize) -> bool {
        self.public_values_lens().contains(&len)
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProofKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compliance" => Ok(ProofKind::Compliance),
            "balance" => Ok(ProofKind::Balance),
            "trade" => Ok(ProofKind::Trade),
            "ownership" => Ok(ProofKind::Ownership),
            _ => Err(CoreError::InvalidValue("unknown proof kind")),
        }
    }
}
