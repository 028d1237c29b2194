#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Innocence pool state machine.
//!
//! Responsibilities:
//! - Maintain the commitment store and its incremental Merkle tree
//! - Maintain the nullifier set and the spent-note and consumed-trade sets
//! - Track which accumulator roots are accepted for proofs
//! - Stage two-phase deposits per depositor
//! - Gate every state transition on a verified proof and apply it atomically
//!
//! Proofs are opaque; verification goes through `innocence-verifier`.
//! Token custody and swap routing are external collaborators behind the
//! [`TokenVault`] and [`SwapRouter`] traits.

pub mod commitment;
pub mod error;
pub mod merkle;
pub mod nullifier;
pub mod pending;
pub mod pool;
pub mod roots;
pub mod router;
pub mod spent;
pub mod vault;

pub use commitment::*;
pub use error::*;
pub use merkle::*;
pub use nullifier::*;
pub use pending::*;
pub use pool::*;
pub use roots::*;
pub use router::*;
pub use spent::*;
pub use vault::*;
