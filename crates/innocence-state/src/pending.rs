//! Two-phase deposit staging.
//!
//! One slot per depositor. `prepare` records the expected amount and a
//! snapshot of the pool's balance of the token; the depositor then transfers
//! value in; `complete` is allowed once the balance has grown by at least the
//! expected amount minus [`DEPOSIT_TOLERANCE_BPS`].
//!
//! Re-preparing overwrites the slot (last writer wins). The overwrite is
//! reported to the caller rather than hidden.
//!
//! Funding is observed as the increase of the shared pool balance, so two
//! depositors of the same token preparing concurrently can each see the other's
//! transfer.

use borsh::{BorshDeserialize, BorshSerialize};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use innocence_core::{Address, Amount, TokenId, DEPOSIT_TOLERANCE_BPS};

/// A staged deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PendingDeposit {
    /// Token being deposited.
    pub token: TokenId,
    /// Expected amount.
    pub amount: u64,
    /// Pool balance of `token` when the deposit was prepared.
    pub balance_before: Amount,
    /// Preparation time.
    pub prepared_at: u64,
    /// Whether the deposit has been completed.
    pub completed: bool,
}

impl PendingDeposit {
    /// Smallest balance increase that counts as funded.
    pub fn required_increase(&self) -> Amount {
        Amount::from_u64(self.amount).less_bps(DEPOSIT_TOLERANCE_BPS)
    }

    /// Whether `current_balance` reflects enough funding since the snapshot.
    pub fn is_funded(&self, current_balance: Amount) -> bool {
        current_balance.saturating_sub(self.balance_before) >= self.required_increase()
    }
}

/// Explicit state of a depositor's slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositPhase {
    /// Nothing staged.
    Empty,
    /// Staged, funding not observed yet.
    Prepared,
    /// Staged and funded; ready to complete.
    Funded,
    /// Completed; a new prepare starts over.
    Completed,
}

/// Per-depositor deposit slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingDepositLedger {
    slots: HashMap<Address, PendingDeposit>,
}

impl PendingDepositLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `depositor`, completed or not.
    pub fn get(&self, depositor: &Address) -> Option<&PendingDeposit> {
        self.slots.get(depositor)
    }

    /// Active (non-completed) deposit of `depositor`.
    pub fn active(&self, depositor: &Address) -> Option<&PendingDeposit> {
        self.slots.get(depositor).filter(|d| !d.completed)
    }

    /// Stage a deposit, replacing the slot. Returns `true` if an unfinished
    /// deposit was discarded.
    pub fn prepare(&mut self, depositor: Address, deposit: PendingDeposit) -> bool {
        match self.slots.insert(depositor, deposit) {
            Some(prev) => !prev.completed,
            None => false,
        }
    }

    /// Mark the active deposit of `depositor` completed and return it.
    pub fn complete(&mut self, depositor: &Address) -> Option<PendingDeposit> {
        let slot = self.slots.get_mut(depositor).filter(|d| !d.completed)?;
        slot.completed = true;
        Some(*slot)
    }

    /// Phase of `depositor`'s slot given the pool's current balance of its token.
    pub fn phase(&self, depositor: &Address, balance_of: impl Fn(TokenId) -> Amount) -> DepositPhase {
        match self.slots.get(depositor) {
            None => DepositPhase::Empty,
            Some(d) if d.completed => DepositPhase::Completed,
            Some(d) if d.is_funded(balance_of(d.token)) => DepositPhase::Funded,
            Some(_) => DepositPhase::Prepared,
        }
    }

    /// Restore a slot verbatim.
    pub fn restore(&mut self, depositor: Address, deposit: PendingDeposit) {
        self.slots.insert(depositor, deposit);
    }

    /// Iterate slots in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &PendingDeposit)> {
        self.slots.iter()
    }
}
