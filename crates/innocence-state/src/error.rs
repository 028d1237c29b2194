//! Pool errors.

use innocence_core::{CoreError, TokenId};
use innocence_verifier::{GateError, ProofKind};
use thiserror::Error;

/// Insert-once store failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Key already present.
    #[error("already exists")]
    AlreadyExists,
    /// The commitment tree has no free leaves.
    #[error("commitment tree is full")]
    TreeFull,
}

/// Reasons a pool operation is rejected. Every variant leaves state untouched.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The verifier rejected the proof (or it exceeded the size bound).
    #[error("invalid {kind} proof")]
    ProofInvalid {
        /// Proof kind.
        kind: ProofKind,
    },
    /// Public values disagree with a call argument or reference an unknown note.
    #[error("{kind} public values do not match the supplied {field}")]
    ProofArgumentMismatch {
        /// Proof kind.
        kind: ProofKind,
        /// Mismatched argument.
        field: &'static str,
    },
    /// Public values failed to decode.
    #[error("malformed {kind} public values: {source}")]
    MalformedPublicValues {
        /// Proof kind.
        kind: ProofKind,
        /// Decoding failure.
        #[source]
        source: CoreError,
    },
    /// Nullifier already consumed, or the proven note was already withdrawn.
    #[error("nullifier or note already spent")]
    DoubleSpend,
    /// The same trade claim was already settled.
    #[error("trade already settled")]
    TradeReplayed,
    /// Commitment already recorded.
    #[error("commitment already recorded")]
    DuplicateCommitment,
    /// Proof anchored to a root the pool does not accept.
    #[error("stale or unknown merkle root")]
    StaleOrUnknownRoot,
    /// Proven balance is below the requested amount.
    #[error("proven balance is below the requested amount")]
    InsufficientProvenBalance,
    /// Proof asset differs from the requested token.
    #[error("proof asset {proven} does not match requested token {requested}")]
    AssetMismatch {
        /// Asset in the public values.
        proven: TokenId,
        /// Token requested by the caller.
        requested: TokenId,
    },
    /// The pool does not hold enough of the token.
    #[error("insufficient pool liquidity")]
    InsufficientContractLiquidity {
        /// Token, if the shortfall concerns a single token.
        token: Option<TokenId>,
    },
    /// Caller has no prepared deposit.
    #[error("no pending deposit")]
    NoPendingDeposit,
    /// The pool balance has not increased by the expected amount since prepare.
    #[error("deposit not funded")]
    DepositNotFunded,
    /// Compliance certificate expired.
    #[error("compliance certificate expired")]
    ComplianceExpired,
    /// Compliance proof names an authority other than the configured one.
    #[error("unknown compliance authority")]
    UnknownComplianceAuthority,
    /// Caller is not the admin authority.
    #[error("unauthorized")]
    Unauthorized,
    /// Trade parameters violate the trade rules.
    #[error("invalid trade: {0}")]
    InvalidTrade(&'static str),
    /// Amount must be non-zero.
    #[error("amount must be non-zero")]
    ZeroAmount,
    /// Reason string exceeds the limit.
    #[error("reason too long")]
    ReasonTooLong,
    /// Arithmetic overflow.
    #[error("amount overflow")]
    AmountOverflow,
    /// The commitment tree is full.
    #[error("commitment tree is full")]
    TreeFull,
    /// The swap router refused or under-filled the trade.
    #[error("router: {0}")]
    Router(String),
    /// The token vault failed.
    #[error("vault: {0}")]
    Vault(String),
}

impl PoolError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::ProofInvalid { .. } => "ProofInvalid",
            PoolError::ProofArgumentMismatch { .. } => "ProofArgumentMismatch",
            PoolError::MalformedPublicValues { .. } => "MalformedPublicValues",
            PoolError::DoubleSpend => "DoubleSpend",
            PoolError::TradeReplayed => "TradeReplayed",
            PoolError::DuplicateCommitment => "DuplicateCommitment",
            PoolError::StaleOrUnknownRoot => "StaleOrUnknownRoot",
            PoolError::InsufficientProvenBalance => "InsufficientProvenBalance",
            PoolError::AssetMismatch { .. } => "AssetMismatch",
            PoolError::InsufficientContractLiquidity { .. } => "InsufficientContractLiquidity",
            PoolError::NoPendingDeposit => "NoPendingDeposit",
            PoolError::DepositNotFunded => "DepositNotFunded",
            PoolError::ComplianceExpired => "ComplianceExpired",
            PoolError::UnknownComplianceAuthority => "UnknownComplianceAuthority",
            PoolError::Unauthorized => "Unauthorized",
            PoolError::InvalidTrade(_) => "InvalidTrade",
            PoolError::ZeroAmount => "ZeroAmount",
            PoolError::ReasonTooLong => "ReasonTooLong",
            PoolError::AmountOverflow => "AmountOverflow",
            PoolError::TreeFull => "TreeFull",
            PoolError::Router(_) => "Router",
            PoolError::Vault(_) => "Vault",
        }
    }
}

impl From<GateError> for PoolError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Rejected { kind } => PoolError::ProofInvalid { kind },
            GateError::ProofTooLarge { kind, .. } => PoolError::ProofInvalid { kind },
            GateError::Malformed { kind, source } => {
                PoolError::MalformedPublicValues { kind, source }
            }
            GateError::Mismatch { kind, field } => PoolError::ProofArgumentMismatch { kind, field },
        }
    }
}
