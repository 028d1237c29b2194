//! Protocol-wide constants for the Innocence pool.

/// Protocol semantic version (v0).
pub const PROTOCOL_VERSION: u16 = 0;

/// Length in bytes of a 32-byte hash.
pub const HASH32_LEN: usize = 32;

/// Length in bytes of a note commitment.
pub const COMMITMENT_LEN: usize = 32;

/// Length in bytes of a nullifier (hash).
pub const NULLIFIER_LEN: usize = 32;

/// Length in bytes of an EVM account address.
pub const ADDRESS_LEN: usize = 20;

/// Depth of the commitment accumulator.
///
/// Capacity is `2^COMMITMENT_TREE_DEPTH` leaves.
pub const COMMITMENT_TREE_DEPTH: usize = 20;

/// Funding tolerance on deposit completion, in basis points of the expected amount.
///
/// Absorbs rounding from wei/native-unit conversions. 100 bps = 1%.
pub const DEPOSIT_TOLERANCE_BPS: u64 = 100;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// ABI word size.
pub const ABI_WORD_LEN: usize = 32;

/// Encoded length of balance proof public values `(bytes32,bytes32,uint256,uint64)`.
pub const BALANCE_PUBLIC_VALUES_LEN: usize = 4 * ABI_WORD_LEN;

/// Encoded length of compliance proof public values `(bytes32,address,uint256,bytes32)`.
pub const COMPLIANCE_PUBLIC_VALUES_LEN: usize = 4 * ABI_WORD_LEN;

/// Encoded length of trade proof public values `(bytes32,uint64,uint64,uint256,uint256)`.
pub const TRADE_PUBLIC_VALUES_LEN: usize = 5 * ABI_WORD_LEN;

/// Encoded length of root-anchored trade proof public values (trailing `bytes32` root).
pub const ANCHORED_TRADE_PUBLIC_VALUES_LEN: usize = 6 * ABI_WORD_LEN;

/// Encoded length of ownership proof public values `(bytes32,bytes32)`.
pub const OWNERSHIP_PUBLIC_VALUES_LEN: usize = 2 * ABI_WORD_LEN;

/// Maximum accepted proof size in bytes.
///
/// DoS bound applied before the verifier is invoked.
pub const MAX_PROOF_BYTES: usize = 64 * 1024;

/// Maximum length of an emergency-withdrawal reason string.
pub const MAX_REASON_LEN: usize = 256;

/// Domain separator used when deriving event identifiers.
pub const DS_EVENT: &[u8] = b"INNOCENCE::EVENT::V0";

/// Domain separator used when deriving wallet note identifiers.
pub const DS_NOTE: &[u8] = b"INNOCENCE::NOTE::V0";

/// Domain separator used when deriving consumed-trade digests.
pub const DS_TRADE: &[u8] = b"INNOCENCE::TRADE::V0";

/// Domain separator of signed RPC requests.
pub const DS_RPC: &[u8] = b"INNOCENCE::RPC::V0";

/// Longest a signed RPC request stays valid, in seconds.
pub const MAX_REQUEST_TTL_SECS: u64 = 300;
