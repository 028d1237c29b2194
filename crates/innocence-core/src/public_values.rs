// Wire-visible. Layouts are committed to by the circuits and must not change.
//! ABI public-values codecs.
//!
//! Every proof carries a fixed-layout Solidity ABI tuple of public values. The
//! pool never interprets proof bytes, but it does decode these tuples to bind
//! the proof to the call arguments and to its own state.
//!
//! | kind       | layout                                                   | bytes      |
//! |------------|----------------------------------------------------------|------------|
//! | balance    | `(bytes32,bytes32,uint256,uint64)`                       | 128        |
//! | compliance | `(bytes32,address,uint256,bytes32)`                      | 128        |
//! | trade      | `(bytes32,uint64,uint64,uint256,uint256[,bytes32])`      | 160 / 192  |
//! | ownership  | `(bytes32,bytes32)`                                      | 64         |
//!
//! Lengths are checked before decoding so a truncated or padded buffer is
//! reported as a length error rather than a generic ABI failure.

use crate::constants::*;
use crate::serialization::hash32;
use crate::types::{Address, Amount, Commitment, CoreError, Hash32, MerkleRoot, Nullifier, TokenId};
use alloy_primitives::{FixedBytes, U256};
use alloy_sol_types::SolType;

#[allow(missing_docs)]
mod abi {
    use alloy_sol_types::sol;

    sol! {
        struct BalanceProofPublicValues {
            bytes32 commitment;
            bytes32 merkleRoot;
            uint256 minBalance;
            uint64 assetId;
        }

        struct ComplianceProofPublicValues {
            bytes32 commitment;
            address complianceAuthority;
            uint256 validUntil;
            bytes32 certificateHash;
        }

        struct TradeProofPublicValues {
            bytes32 commitment;
            uint64 fromAsset;
            uint64 toAsset;
            uint256 fromAmount;
            uint256 minToAmount;
        }

        struct AnchoredTradeProofPublicValues {
            bytes32 commitment;
            uint64 fromAsset;
            uint64 toAsset;
            uint256 fromAmount;
            uint256 minToAmount;
            bytes32 merkleRoot;
        }

        struct OwnershipProofPublicValues {
            bytes32 commitment;
            bytes32 nullifierHash;
        }
    }
}

fn check_len(kind: &'static str, expected: &'static [usize], got: usize) -> Result<(), CoreError> {
    if expected.contains(&got) {
        return Ok(());
    }
    Err(CoreError::PublicValuesLength {
        kind,
        expected,
        got,
    })
}

fn b32(h: &FixedBytes<32>) -> [u8; 32] {
    h.0
}

/// Public values of a balance proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalancePublicValues {
    /// Note the balance claim is about.
    pub commitment: Commitment,
    /// Accumulator root the proof is anchored to.
    pub merkle_root: MerkleRoot,
    /// Proven lower bound on the note's balance.
    pub min_balance: Amount,
    /// Asset the balance is denominated in.
    pub asset_id: TokenId,
}

impl BalancePublicValues {
    /// Decode from exactly [`BALANCE_PUBLIC_VALUES_LEN`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        check_len("balance", &[BALANCE_PUBLIC_VALUES_LEN], bytes.len())?;
        let v = <abi::BalanceProofPublicValues as SolType>::abi_decode_validate(bytes)
            .map_err(|_| CoreError::AbiDecode { kind: "balance" })?;
        Ok(Self {
            commitment: Commitment(b32(&v.commitment)),
            merkle_root: Hash32(b32(&v.merkleRoot)),
            min_balance: Amount(v.minBalance),
            asset_id: TokenId(v.assetId),
        })
    }

    /// ABI-encode.
    pub fn encode(&self) -> Vec<u8> {
        let v = abi::BalanceProofPublicValues {
            commitment: FixedBytes(self.commitment.0),
            merkleRoot: FixedBytes(self.merkle_root.0),
            minBalance: self.min_balance.0,
            assetId: self.asset_id.0,
        };
        <abi::BalanceProofPublicValues as SolType>::abi_encode(&v)
    }
}

/// Public values of a compliance proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompliancePublicValues {
    /// Commitment being admitted to the pool.
    pub commitment: Commitment,
    /// Authority that signed off on the certificate.
    pub compliance_authority: Address,
    /// Unix timestamp (seconds) after which the certificate is no longer valid.
    pub valid_until: U256,
    /// Hash of the compliance certificate.
    pub certificate_hash: Hash32,
}

impl CompliancePublicValues {
    /// Decode from exactly [`COMPLIANCE_PUBLIC_VALUES_LEN`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        check_len("compliance", &[COMPLIANCE_PUBLIC_VALUES_LEN], bytes.len())?;
        let v = <abi::ComplianceProofPublicValues as SolType>::abi_decode_validate(bytes)
            .map_err(|_| CoreError::AbiDecode { kind: "compliance" })?;
        Ok(Self {
            commitment: Commitment(b32(&v.commitment)),
            compliance_authority: Address(v.complianceAuthority.0 .0),
            valid_until: v.validUntil,
            certificate_hash: Hash32(b32(&v.certificateHash)),
        })
    }

    /// ABI-encode.
    pub fn encode(&self) -> Vec<u8> {
        let v = abi::ComplianceProofPublicValues {
            commitment: FixedBytes(self.commitment.0),
            complianceAuthority: alloy_primitives::Address::from(self.compliance_authority.0),
            validUntil: self.valid_until,
            certificateHash: FixedBytes(self.certificate_hash.0),
        };
        <abi::ComplianceProofPublicValues as SolType>::abi_encode(&v)
    }

    /// Whether the certificate is still valid at `now` (inclusive).
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.valid_until >= U256::from(now)
    }
}

/// Public values of a trade proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradePublicValues {
    /// Note whose balance is re-allocated.
    pub commitment: Commitment,
    /// Asset sold.
    pub from_asset: TokenId,
    /// Asset bought.
    pub to_asset: TokenId,
    /// Amount of `from_asset` sold.
    pub from_amount: Amount,
    /// Minimum acceptable fill in `to_asset`.
    pub min_to_amount: Amount,
    /// Accumulator root, present only in the anchored 192-byte layout.
    pub merkle_root: Option<MerkleRoot>,
}

impl TradePublicValues {
    /// Identity of the trade claim: equal for any two encodings of the same
    /// values, whatever proof bytes accompany them.
    pub fn digest(&self) -> Hash32 {
        hash32(DS_TRADE, &self.encode())
    }

    /// Decode from [`TRADE_PUBLIC_VALUES_LEN`] or [`ANCHORED_TRADE_PUBLIC_VALUES_LEN`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        match bytes.len() {
            TRADE_PUBLIC_VALUES_LEN => {
                let v = <abi::TradeProofPublicValues as SolType>::abi_decode_validate(bytes)
                    .map_err(|_| CoreError::AbiDecode { kind: "trade" })?;
                Ok(Self {
                    commitment: Commitment(b32(&v.commitment)),
                    from_asset: TokenId(v.fromAsset),
                    to_asset: TokenId(v.toAsset),
                    from_amount: Amount(v.fromAmount),
                    min_to_amount: Amount(v.minToAmount),
                    merkle_root: None,
                })
            }
            ANCHORED_TRADE_PUBLIC_VALUES_LEN => {
                let v = <abi::AnchoredTradeProofPublicValues as SolType>::abi_decode_validate(bytes)
                    .map_err(|_| CoreError::AbiDecode { kind: "trade" })?;
                Ok(Self {
                    commitment: Commitment(b32(&v.commitment)),
                    from_asset: TokenId(v.fromAsset),
                    to_asset: TokenId(v.toAsset),
                    from_amount: Amount(v.fromAmount),
                    min_to_amount: Amount(v.minToAmount),
                    merkle_root: Some(Hash32(b32(&v.merkleRoot))),
                })
            }
            got => Err(CoreError::PublicValuesLength {
                kind: "trade",
                expected: &[TRADE_PUBLIC_VALUES_LEN, ANCHORED_TRADE_PUBLIC_VALUES_LEN],
                got,
            }),
        }
    }

    /// ABI-encode; the root is appended only when present.
    pub fn encode(&self) -> Vec<u8> {
        match self.merkle_root {
            None => {
                let v = abi::TradeProofPublicValues {
                    commitment: FixedBytes(self.commitment.0),
                    fromAsset: self.from_asset.0,
                    toAsset: self.to_asset.0,
                    fromAmount: self.from_amount.0,
                    minToAmount: self.min_to_amount.0,
                };
                <abi::TradeProofPublicValues as SolType>::abi_encode(&v)
            }
            Some(root) => {
                let v = abi::AnchoredTradeProofPublicValues {
                    commitment: FixedBytes(self.commitment.0),
                    fromAsset: self.from_asset.0,
                    toAsset: self.to_asset.0,
                    fromAmount: self.from_amount.0,
                    minToAmount: self.min_to_amount.0,
                    merkleRoot: FixedBytes(root.0),
                };
                <abi::AnchoredTradeProofPublicValues as SolType>::abi_encode(&v)
            }
        }
    }
}

/// Public values of an ownership proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnershipPublicValues {
    /// Note whose ownership is attested.
    pub commitment: Commitment,
    /// Nullifier hash of that note.
    pub nullifier_hash: Nullifier,
}

impl OwnershipPublicValues {
    /// Decode from exactly [`OWNERSHIP_PUBLIC_VALUES_LEN`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        check_len("ownership", &[OWNERSHIP_PUBLIC_VALUES_LEN], bytes.len())?;
        let v = <abi::OwnershipProofPublicValues as SolType>::abi_decode_validate(bytes)
            .map_err(|_| CoreError::AbiDecode { kind: "ownership" })?;
        Ok(Self {
            commitment: Commitment(b32(&v.commitment)),
            nullifier_hash: Nullifier(b32(&v.nullifierHash)),
        })
    }

    /// ABI-encode.
    pub fn encode(&self) -> Vec<u8> {
        let v = abi::OwnershipProofPublicValues {
            commitment: FixedBytes(self.commitment.0),
            nullifierHash: FixedBytes(self.nullifier_hash.0),
        };
        <abi::OwnershipProofPublicValues as SolType>::abi_encode(&v)
    }
}
