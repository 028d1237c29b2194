#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Innocence core: canonical types, constants, hashing, public-values codecs and events.

pub mod constants;
pub mod crypto;
pub mod events;
pub mod public_values;
pub mod serialization;
pub mod types;

pub use constants::*;
pub use crypto::*;
pub use events::*;
pub use public_values::*;
pub use serialization::*;
pub use types::*;
