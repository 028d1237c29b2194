//! Verifier adapter errors.

use innocence_core::CoreError;
use thiserror::Error;

use crate::kind::ProofKind;

/// Failure to accept a proof together with its public values.
#[derive(Debug, Error)]
pub enum GateError {
    /// The verifier rejected the proof.
    #[error("{kind} proof rejected by verifier")]
    Rejected {
        /// Proof kind.
        kind: ProofKind,
    },
    /// The proof exceeds the accepted size.
    #[error("{kind} proof is {got} bytes, limit is {limit}")]
    ProofTooLarge {
        /// Proof kind.
        kind: ProofKind,
        /// Proof size.
        got: usize,
        /// Size limit.
        limit: usize,
    },
    /// The public values could not be decoded.
    #[error("malformed {kind} public values: {source}")]
    Malformed {
        /// Proof kind.
        kind: ProofKind,
        /// Decoding failure.
        #[source]
        source: CoreError,
    },
    /// The public values disagree with the argument supplied with the proof.
    #[error("{kind} public values do not match the supplied {field}")]
    Mismatch {
        /// Proof kind.
        kind: ProofKind,
        /// Mismatched argument.
        field: &'static str,
    },
}
