#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Innocence verifier adapter.
//!
//! Proofs are opaque byte strings checked by an external verifier behind the
//! [`ProofVerifier`] seam. [`ProofGate`] wraps that seam: it verifies under the
//! key for the proof's [`ProofKind`], decodes the ABI public values and binds
//! them to the arguments supplied alongside the proof.

pub mod error;
pub mod gate;
pub mod keys;
pub mod kind;
pub mod registry;
pub mod verifier;

pub use error::*;
pub use gate::*;
pub use keys::*;
pub use kind::*;
pub use registry::*;
pub use verifier::*;
