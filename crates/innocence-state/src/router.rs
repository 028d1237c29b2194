//! Swap routing seam.
//!
//! A trade re-allocates a note's hidden balance from one asset to another. The
//! router quotes the fill without side effects; the pool checks it against the
//! proven minimum and only then settles.

use borsh::{BorshDeserialize, BorshSerialize};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use innocence_core::{Amount, Commitment, TokenId, TradePublicValues};

/// Balance change applied to a note by a trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BalanceDelta {
    /// Traded note.
    pub commitment: Commitment,
    /// Asset debited.
    pub from_asset: TokenId,
    /// Asset credited.
    pub to_asset: TokenId,
    /// Amount debited.
    pub from_amount: Amount,
    /// Amount credited.
    pub to_amount: Amount,
    /// Trade time.
    pub timestamp: u64,
}

/// External balance-mutation collaborator.
pub trait SwapRouter {
    /// Fill the router would give for `trade`. Must not mutate.
    fn quote(&self, trade: &TradePublicValues) -> Result<Amount, String>;

    /// Apply a delta previously accepted by the pool.
    fn settle(&mut self, delta: &BalanceDelta);
}

/// Router that fills every trade at its minimum and records deltas per note.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShadowBalanceRouter {
    deltas: HashMap<Commitment, Vec<BalanceDelta>>,
}

impl ShadowBalanceRouter {
    /// Empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deltas recorded for a note, oldest first.
    pub fn deltas(&self, commitment: &Commitment) -> &[BalanceDelta] {
        self.deltas.get(commitment).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of recorded trades.
    pub fn trade_count(&self) -> usize {
        self.deltas.values().map(Vec::len).sum()
    }
}

impl SwapRouter for ShadowBalanceRouter {
    fn quote(&self, trade: &TradePublicValues) -> Result<Amount, String> {
        Ok(trade.min_to_amount)
    }

    fn settle(&mut self, delta: &BalanceDelta) {
        self.deltas.entry(delta.commitment).or_default().push(*delta);
    }
}
