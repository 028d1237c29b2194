// Wire-visible. Changes must stay in lockstep with the proving circuits.
//! Canonical protocol types for the Innocence pool.
//!
//! This module defines the value types shared by every layer: fixed-size
//! hashes, note commitments, nullifier hashes, account addresses, token
//! identifiers and amounts. Persisted encodings (Borsh) of these types must
//! remain backward-compatible once released.

use crate::constants::*;
pub use alloy_primitives::U256;
use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use core::str::FromStr;
use std::io::{Read, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors related to parsing, validation, or construction of core protocol types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Hex string had an unexpected byte length.
    #[error("invalid hex length: expected {expected} bytes, got {got} bytes")]
    InvalidHexLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Arithmetic overflow or underflow occurred.
    #[error("amount overflow or underflow")]
    AmountOverflow,

    /// Public values had the wrong encoded length for their proof kind.
    #[error("{kind} public values must be one of {expected:?} bytes, got {got}")]
    PublicValuesLength {
        /// Proof kind name.
        kind: &'static str,
        /// Accepted encoded lengths.
        expected: &'static [usize],
        /// Actual length.
        got: usize,
    },

    /// ABI decoding of public values failed.
    #[error("abi decode failed for {kind} public values")]
    AbiDecode {
        /// Proof kind name.
        kind: &'static str,
    },

    /// A value violated protocol constraints.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
}

/// Parse a `0x`-optional hex string into a fixed-size byte array.
pub fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], CoreError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(CoreError::InvalidHexLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Declares a fixed-size byte newtype with hex `Debug`/`Display`/`FromStr`
/// and, with the `serde` feature, `0x`-prefixed hex (de)serialization.
macro_rules! fixed_bytes_type {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Returns the all-zero value.
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Returns the underlying byte array.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Whether every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }

            /// `0x`-prefixed lowercase hex.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(value: [u8; $len]) -> Self {
                Self(value)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_fixed_hex::<$len>(s).map(Self)
            }
        }

        #[cfg(feature = "serde")]
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes_type!(
    /// Fixed-size 32-byte hash used throughout the protocol.
    Hash32,
    HASH32_LEN
);

fixed_bytes_type!(
    /// Commitment to a private note: `SHA256(secret || nullifier)`.
    Commitment,
    COMMITMENT_LEN
);

fixed_bytes_type!(
    /// Nullifier hash revealed when a note is spent: `SHA256(nullifier)`.
    Nullifier,
    NULLIFIER_LEN
);

fixed_bytes_type!(
    /// 20-byte EVM account address (caller, recipient, authority).
    Address,
    ADDRESS_LEN
);

/// Root of the commitment accumulator.
pub type MerkleRoot = Hash32;

/// Token identifier (HyperCore spot token index, e.g. `150` for HYPE).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token amount in the token's smallest unit, 256-bit to match `uint256`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Amount(pub U256);

impl Amount {
    /// Returns a zero amount.
    pub const fn zero() -> Self {
        Self(U256::ZERO)
    }

    /// Constructs an amount from a `u64`.
    pub fn from_u64(v: u64) -> Self {
        Self(U256::from(v))
    }

    /// Whether the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Result<Self, CoreError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Result<Self, CoreError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Amount) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `self - floor(self * bps / 10_000)`: the lowest amount within `bps` below `self`.
    pub fn less_bps(self, bps: u64) -> Self {
        let cut = self.0.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR);
        Self(self.0.saturating_sub(cut))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    /// Accepts decimal or `0x`-prefixed hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s.trim())
            .map(Self)
            .map_err(|_| CoreError::InvalidValue("invalid amount"))
    }
}

// U256 is persisted as 32 big-endian bytes.
impl BorshSerialize for Amount {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.0.to_be_bytes::<32>())
    }
}

impl BorshDeserialize for Amount {
    fn deserialize_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = [0u8; 32];
        reader.read_exact(&mut buf)?;
        Ok(Self(U256::from_be_bytes(buf)))
    }
}
