//! Token custody seam.

use std::collections::BTreeMap;

use innocence_core::{Address, Amount, TokenId};

use crate::error::PoolError;

/// Holds the pool's funds.
///
/// `transfer_out` must succeed whenever `balance_of(token) >= amount`; the pool
/// checks liquidity before calling it and relies on that to stay atomic.
pub trait TokenVault {
    /// Pool balance of `token`.
    fn balance_of(&self, token: TokenId) -> Amount;

    /// Receive `amount` of `token`; returns the new balance.
    fn credit(&mut self, token: TokenId, amount: Amount) -> Result<Amount, PoolError>;

    /// Send `amount` of `token` to `to`; returns the new balance.
    fn transfer_out(&mut self, token: TokenId, to: &Address, amount: Amount) -> Result<Amount, PoolError>;

    /// Tokens with a non-zero balance, in ascending order.
    fn held_tokens(&self) -> Vec<TokenId>;
}

/// In-process ledger of balances per token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerVault {
    balances: BTreeMap<TokenId, Amount>,
}

impl LedgerVault {
    /// Empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Vault with the given balances.
    pub fn with_balances(balances: impl IntoIterator<Item = (TokenId, Amount)>) -> Self {
        Self {
            balances: balances.into_iter().filter(|(_, a)| !a.is_zero()).collect(),
        }
    }

    /// All non-zero balances.
    pub fn balances(&self) -> impl Iterator<Item = (&TokenId, &Amount)> {
        self.balances.iter()
    }
}

impl TokenVault for LedgerVault {
    fn balance_of(&self, token: TokenId) -> Amount {
        self.balances.get(&token).copied().unwrap_or_default()
    }

    fn credit(&mut self, token: TokenId, amount: Amount) -> Result<Amount, PoolError> {
        let new = self
            .balance_of(token)
            .checked_add(amount)
            .map_err(|_| PoolError::AmountOverflow)?;
        self.balances.insert(token, new);
        Ok(new)
    }

    fn transfer_out(&mut self, token: TokenId, _to: &Address, amount: Amount) -> Result<Amount, PoolError> {
        let new = self
            .balance_of(token)
            .checked_sub(amount)
            .map_err(|_| PoolError::InsufficientContractLiquidity { token: Some(token) })?;
        if new.is_zero() {
            self.balances.remove(&token);
        } else {
            self.balances.insert(token, new);
        }
        Ok(new)
    }

    fn held_tokens(&self) -> Vec<TokenId> {
        self.balances.keys().copied().collect()
    }
}
