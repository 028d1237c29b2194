//! Auditable pool events.
//!
//! Every successful state transition emits exactly one event. Events are
//! journaled by the node in emission order and served over RPC.

use crate::types::{Address, Amount, Commitment, Nullifier, TokenId};
use borsh::{BorshDeserialize, BorshSerialize};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An event emitted by a successful pool operation.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "type"))]
pub enum PoolEvent {
    /// A commitment was admitted to the pool.
    PrivateDeposit {
        /// Recorded commitment.
        commitment: Commitment,
        /// Block time of the deposit.
        timestamp: u64,
    },
    /// A note was spent and funds left the pool.
    PrivateWithdraw {
        /// Consumed nullifier hash.
        nullifier: Nullifier,
        /// Block time of the withdrawal.
        timestamp: u64,
    },
    /// A note's implicit balance was re-allocated by a trade.
    PrivateTrade {
        /// Traded commitment.
        commitment: Commitment,
        /// Block time of the trade.
        timestamp: u64,
    },
    /// Admin-initiated liquidity recovery.
    EmergencyWithdraw {
        /// Receiver of the funds.
        recipient: Address,
        /// Token moved.
        token: TokenId,
        /// Amount moved.
        amount: Amount,
        /// Operator-supplied reason.
        reason: String,
    },
    /// A depositor staged a deposit.
    DepositPrepared {
        /// Depositor identity.
        depositor: Address,
        /// Token to be deposited.
        token: TokenId,
        /// Expected amount.
        amount: u64,
        /// Whether an unfinished deposit was discarded.
        overwrote: bool,
    },
    /// Value was transferred into the pool.
    PoolFunded {
        /// Sender.
        from: Address,
        /// Token received.
        token: TokenId,
        /// Amount received.
        amount: Amount,
    },
}

impl PoolEvent {
    /// Stable event name, as used in logs and RPC.
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::PrivateDeposit { .. } => "PrivateDeposit",
            PoolEvent::PrivateWithdraw { .. } => "PrivateWithdraw",
            PoolEvent::PrivateTrade { .. } => "PrivateTrade",
            PoolEvent::EmergencyWithdraw { .. } => "EmergencyWithdraw",
            PoolEvent::DepositPrepared { .. } => "DepositPrepared",
            PoolEvent::PoolFunded { .. } => "PoolFunded",
        }
    }
}
