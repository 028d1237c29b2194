//! The privacy pool state machine.
//!
//! Every operation runs all of its checks before touching any store, so an
//! `Err` always leaves the pool, the vault, the router and the event journal
//! exactly as they were. A successful operation returns a [`Receipt`] listing
//! the emitted events and the state changes in the order they were applied,
//! which is what the node persists.

use serde::Serialize;
use tracing::{info, warn};

use innocence_core::{
    Address, Amount, Commitment, Hash32, MerkleRoot, Nullifier, PoolEvent, TokenId,
    MAX_REASON_LEN,
};
use innocence_verifier::{ProofGate, ProofKind, ProofVerifier, VerifyingKeys};

use crate::commitment::CommitmentSet;
use crate::error::{PoolError, StoreError};
use crate::merkle::MerklePath;
use crate::nullifier::NullifierSet;
use crate::pending::{DepositPhase, PendingDeposit, PendingDepositLedger};
use crate::roots::{RootPolicy, RootRegister};
use crate::router::{BalanceDelta, SwapRouter};
use crate::spent::{SpentNoteSet, TradeDigestSet};
use crate::vault::TokenVault;

const POOL: &str = "innocence::pool";
const ADMIN: &str = "innocence::admin";

/// Pool policy fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Authority allowed to use the emergency path.
    pub admin: Address,
    /// Authority whose compliance certificates are accepted.
    pub compliance_authority: Address,
    /// Which roots balance and trade proofs may be anchored to.
    pub root_policy: RootPolicy,
    /// Verification keys per proof kind.
    pub keys: VerifyingKeys,
}

/// Caller identity and block time of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// `msg.sender` equivalent.
    pub caller: Address,
    /// `block.timestamp` equivalent, in seconds.
    pub timestamp: u64,
}

/// A single persisted effect of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum StateChange {
    /// A commitment was recorded at `leaf_index`.
    CommitmentAdded {
        /// Commitment.
        commitment: Commitment,
        /// Leaf index in the tree.
        leaf_index: u64,
    },
    /// A nullifier was consumed.
    NullifierSpent {
        /// Nullifier hash.
        nullifier: Nullifier,
    },
    /// The note behind a commitment was withdrawn.
    NoteSpent {
        /// Commitment named by the balance proof.
        commitment: Commitment,
    },
    /// A depositor's slot was written.
    PendingDepositSet {
        /// Depositor.
        depositor: Address,
        /// New slot content.
        deposit: PendingDeposit,
    },
    /// The pool's balance of a token changed.
    BalanceSet {
        /// Token.
        token: TokenId,
        /// New balance.
        balance: Amount,
    },
    /// A trade claim was settled.
    TradeRecorded {
        /// Digest of the trade public values.
        digest: Hash32,
        /// Delta.
        delta: BalanceDelta,
    },
}

/// Outcome of a successful operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// Sequence number of the first event in the journal.
    pub first_seq: u64,
    /// Emitted events; never empty.
    pub events: Vec<PoolEvent>,
    /// Applied changes, in order.
    pub changes: Vec<StateChange>,
}

/// Persisted pool contents used to rebuild a pool on restart.
#[derive(Clone, Debug, Default)]
pub struct PoolParts {
    /// Commitments in leaf order.
    pub commitments: Vec<Commitment>,
    /// Spent nullifiers.
    pub nullifiers: Vec<Nullifier>,
    /// Withdrawn notes.
    pub spent_notes: Vec<Commitment>,
    /// Digests of settled trades.
    pub trade_digests: Vec<Hash32>,
    /// Deposit slots.
    pub pending: Vec<(Address, PendingDeposit)>,
    /// Event journal in sequence order.
    pub events: Vec<PoolEvent>,
}

/// Shielded pool over a verifier, a token vault and a swap router.
#[derive(Debug)]
pub struct PrivacyPool<V, T, R> {
    admin: Address,
    compliance_authority: Address,
    gate: ProofGate<V>,
    commitments: CommitmentSet,
    roots: RootRegister,
    nullifiers: NullifierSet,
    spent_notes: SpentNoteSet,
    trades: TradeDigestSet,
    pending: PendingDepositLedger,
    vault: T,
    router: R,
    events: Vec<PoolEvent>,
}

impl<V, T, R> PrivacyPool<V, T, R>
where
    V: ProofVerifier,
    T: TokenVault,
    R: SwapRouter,
{
    /// Empty pool.
    pub fn new(config: PoolConfig, verifier: V, vault: T, router: R) -> Self {
        Self {
            admin: config.admin,
            compliance_authority: config.compliance_authority,
            gate: ProofGate::new(verifier, config.keys),
            commitments: CommitmentSet::new(),
            roots: RootRegister::new(config.root_policy),
            nullifiers: NullifierSet::new(),
            spent_notes: SpentNoteSet::new(),
            trades: TradeDigestSet::new(),
            pending: PendingDepositLedger::new(),
            vault,
            router,
            events: Vec::new(),
        }
    }

    /// Rebuild a pool from persisted parts. Commitments are replayed in leaf
    /// order so the tree and the root history come out as they were.
    pub fn from_parts(
        config: PoolConfig,
        verifier: V,
        vault: T,
        router: R,
        parts: PoolParts,
    ) -> Result<Self, PoolError> {
        let mut pool = Self::new(config, verifier, vault, router);
        for cm in &parts.commitments {
            pool.commitments.insert(*cm).map_err(|e| match e {
                StoreError::AlreadyExists => PoolError::DuplicateCommitment,
                StoreError::TreeFull => PoolError::TreeFull,
            })?;
            pool.roots.insert(cm).map_err(|_| PoolError::TreeFull)?;
        }
        for nf in parts.nullifiers {
            pool.nullifiers
                .insert(nf)
                .map_err(|_| PoolError::DoubleSpend)?;
        }
        for cm in parts.spent_notes {
            pool.spent_notes
                .insert(cm)
                .map_err(|_| PoolError::DoubleSpend)?;
        }
        for digest in parts.trade_digests {
            pool.trades
                .insert(digest)
                .map_err(|_| PoolError::TradeReplayed)?;
        }
        for (who, d) in parts.pending {
            pool.pending.restore(who, d);
        }
        pool.events = parts.events;
        Ok(pool)
    }

    // ---- operations ----

    /// Stage a deposit of `amount` of `token` for the caller, snapshotting the
    /// pool balance. Overwrites any unfinished deposit of the caller.
    pub fn prepare_deposit(
        &mut self,
        ctx: &CallContext,
        token: TokenId,
        amount: u64,
    ) -> Result<Receipt, PoolError> {
        logged("prepare_deposit", self.try_prepare_deposit(ctx, token, amount))
    }

    fn try_prepare_deposit(
        &mut self,
        ctx: &CallContext,
        token: TokenId,
        amount: u64,
    ) -> Result<Receipt, PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let deposit = PendingDeposit {
            token,
            amount,
            balance_before: self.vault.balance_of(token),
            prepared_at: ctx.timestamp,
            completed: false,
        };
        let overwrote = self.pending.prepare(ctx.caller, deposit);
        if overwrote {
            warn!(target: POOL, depositor = %ctx.caller, "unfinished deposit overwritten by prepare");
        }
        info!(target: POOL, depositor = %ctx.caller, %token, amount, "deposit prepared");
        Ok(self.emit(
            vec![PoolEvent::DepositPrepared {
                depositor: ctx.caller,
                token,
                amount,
                overwrote,
            }],
            vec![StateChange::PendingDepositSet {
                depositor: ctx.caller,
                deposit,
            }],
        ))
    }

    /// Fund step of the two-phase deposit: value moves into the pool.
    pub fn transfer_to_pool(
        &mut self,
        ctx: &CallContext,
        token: TokenId,
        amount: Amount,
    ) -> Result<Receipt, PoolError> {
        logged("transfer_to_pool", self.try_transfer_to_pool(ctx, token, amount))
    }

    fn try_transfer_to_pool(
        &mut self,
        ctx: &CallContext,
        token: TokenId,
        amount: Amount,
    ) -> Result<Receipt, PoolError> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        let balance = self.vault.credit(token, amount)?;
        info!(target: POOL, from = %ctx.caller, %token, %amount, "pool funded");
        Ok(self.emit(
            vec![PoolEvent::PoolFunded {
                from: ctx.caller,
                token,
                amount,
            }],
            vec![StateChange::BalanceSet { token, balance }],
        ))
    }

    /// Admit `commitment` for the caller's funded deposit, gated on a
    /// compliance proof bound to that commitment.
    pub fn complete_deposit(
        &mut self,
        ctx: &CallContext,
        commitment: Commitment,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Receipt, PoolError> {
        logged(
            "complete_deposit",
            self.try_complete_deposit(ctx, commitment, proof, public_values),
        )
    }

    fn try_complete_deposit(
        &mut self,
        ctx: &CallContext,
        commitment: Commitment,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Receipt, PoolError> {
        let slot = *self
            .pending
            .active(&ctx.caller)
            .ok_or(PoolError::NoPendingDeposit)?;
        if !slot.is_funded(self.vault.balance_of(slot.token)) {
            return Err(PoolError::DepositNotFunded);
        }
        let pv = self.gate.compliance(&commitment, proof, public_values)?;
        if pv.compliance_authority != self.compliance_authority {
            return Err(PoolError::UnknownComplianceAuthority);
        }
        if !pv.is_valid_at(ctx.timestamp) {
            return Err(PoolError::ComplianceExpired);
        }
        if self.commitments.contains(&commitment) {
            return Err(PoolError::DuplicateCommitment);
        }
        if self.roots.tree().len() >= self.roots.tree().capacity() {
            return Err(PoolError::TreeFull);
        }

        let leaf_index = self.roots.insert(&commitment).map_err(|_| PoolError::TreeFull)?;
        self.commitments
            .insert(commitment)
            .map_err(|_| PoolError::DuplicateCommitment)?;
        let deposit = self
            .pending
            .complete(&ctx.caller)
            .ok_or(PoolError::NoPendingDeposit)?;

        info!(
            target: POOL,
            %commitment,
            leaf_index,
            root = %self.roots.current_root(),
            "deposit completed"
        );
        Ok(self.emit(
            vec![PoolEvent::PrivateDeposit {
                commitment,
                timestamp: ctx.timestamp,
            }],
            vec![
                StateChange::CommitmentAdded {
                    commitment,
                    leaf_index,
                },
                StateChange::PendingDepositSet {
                    depositor: ctx.caller,
                    deposit,
                },
            ],
        ))
    }

    /// Spend a note: consume `nullifier` and pay `amount` of `token` to
    /// `recipient`, gated on a balance proof. The proven commitment is spent
    /// with it, so any remainder above `amount` stays in the pool.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        nullifier: Nullifier,
        recipient: Address,
        token: TokenId,
        amount: Amount,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Receipt, PoolError> {
        logged(
            "withdraw",
            self.try_withdraw(ctx, nullifier, recipient, token, amount, proof, public_values),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn try_withdraw(
        &mut self,
        ctx: &CallContext,
        nullifier: Nullifier,
        recipient: Address,
        token: TokenId,
        amount: Amount,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Receipt, PoolError> {
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        if self.nullifiers.contains(&nullifier) {
            return Err(PoolError::DoubleSpend);
        }
        let pv = self.gate.balance(proof, public_values)?;
        if !self.commitments.contains(&pv.commitment) {
            return Err(PoolError::ProofArgumentMismatch {
                kind: ProofKind::Balance,
                field: "commitment",
            });
        }
        if self.spent_notes.contains(&pv.commitment) {
            return Err(PoolError::DoubleSpend);
        }
        if !self.roots.is_accepted(&pv.merkle_root) {
            return Err(PoolError::StaleOrUnknownRoot);
        }
        if pv.min_balance < amount {
            return Err(PoolError::InsufficientProvenBalance);
        }
        if pv.asset_id != token {
            return Err(PoolError::AssetMismatch {
                proven: pv.asset_id,
                requested: token,
            });
        }
        if self.vault.balance_of(token) < amount {
            return Err(PoolError::InsufficientContractLiquidity { token: Some(token) });
        }

        let balance = self.vault.transfer_out(token, &recipient, amount)?;
        self.nullifiers
            .insert(nullifier)
            .map_err(|_| PoolError::DoubleSpend)?;
        self.spent_notes
            .insert(pv.commitment)
            .map_err(|_| PoolError::DoubleSpend)?;

        info!(target: POOL, %nullifier, %token, %amount, "withdrawal");
        Ok(self.emit(
            vec![PoolEvent::PrivateWithdraw {
                nullifier,
                timestamp: ctx.timestamp,
            }],
            vec![
                StateChange::NullifierSpent { nullifier },
                StateChange::NoteSpent {
                    commitment: pv.commitment,
                },
                StateChange::BalanceSet { token, balance },
            ],
        ))
    }

    /// Re-allocate a note's hidden balance through the router, gated on a
    /// trade proof. The note's nullifier is not consumed, but each trade claim
    /// settles at most once.
    pub fn private_spot_trade(
        &mut self,
        ctx: &CallContext,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Receipt, PoolError> {
        logged(
            "private_spot_trade",
            self.try_private_spot_trade(ctx, proof, public_values),
        )
    }

    fn try_private_spot_trade(
        &mut self,
        ctx: &CallContext,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Receipt, PoolError> {
        let pv = self.gate.trade(proof, public_values)?;
        if pv.from_amount.is_zero() {
            return Err(PoolError::InvalidTrade("from amount must be non-zero"));
        }
        if pv.min_to_amount.is_zero() {
            return Err(PoolError::InvalidTrade("minimum fill must be non-zero"));
        }
        if pv.from_asset == pv.to_asset {
            return Err(PoolError::InvalidTrade("cannot trade an asset for itself"));
        }
        if !self.commitments.contains(&pv.commitment) {
            return Err(PoolError::ProofArgumentMismatch {
                kind: ProofKind::Trade,
                field: "commitment",
            });
        }
        if self.spent_notes.contains(&pv.commitment) {
            return Err(PoolError::DoubleSpend);
        }
        let digest = pv.digest();
        if self.trades.contains(&digest) {
            return Err(PoolError::TradeReplayed);
        }
        if let Some(root) = &pv.merkle_root {
            if !self.roots.is_accepted(root) {
                return Err(PoolError::StaleOrUnknownRoot);
            }
        }
        let fill = self.router.quote(&pv).map_err(PoolError::Router)?;
        if fill < pv.min_to_amount {
            return Err(PoolError::Router(format!(
                "fill {fill} below minimum {}",
                pv.min_to_amount
            )));
        }

        let delta = BalanceDelta {
            commitment: pv.commitment,
            from_asset: pv.from_asset,
            to_asset: pv.to_asset,
            from_amount: pv.from_amount,
            to_amount: fill,
            timestamp: ctx.timestamp,
        };
        self.trades
            .insert(digest)
            .map_err(|_| PoolError::TradeReplayed)?;
        self.router.settle(&delta);

        info!(
            target: POOL,
            commitment = %pv.commitment,
            from = %pv.from_asset,
            to = %pv.to_asset,
            "private trade"
        );
        Ok(self.emit(
            vec![PoolEvent::PrivateTrade {
                commitment: pv.commitment,
                timestamp: ctx.timestamp,
            }],
            vec![StateChange::TradeRecorded { digest, delta }],
        ))
    }

    /// Check an ownership proof for a recorded, unspent note and return its
    /// nullifier hash. Read-only.
    pub fn attest_ownership(
        &self,
        commitment: &Commitment,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Nullifier, PoolError> {
        let pv = self.gate.ownership(commitment, proof, public_values)?;
        if !self.commitments.contains(commitment) {
            return Err(PoolError::ProofArgumentMismatch {
                kind: ProofKind::Ownership,
                field: "commitment",
            });
        }
        if self.nullifiers.contains(&pv.nullifier_hash) || self.spent_notes.contains(commitment) {
            return Err(PoolError::DoubleSpend);
        }
        Ok(pv.nullifier_hash)
    }

    /// Admin recovery of `amount` of `token`. Never touches notes or roots.
    pub fn emergency_withdraw(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
        token: TokenId,
        amount: Amount,
        reason: &str,
    ) -> Result<Receipt, PoolError> {
        logged(
            "emergency_withdraw",
            self.try_emergency_withdraw(ctx, recipient, token, amount, reason),
        )
    }

    fn try_emergency_withdraw(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
        token: TokenId,
        amount: Amount,
        reason: &str,
    ) -> Result<Receipt, PoolError> {
        self.check_admin(ctx, reason)?;
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        if self.vault.balance_of(token) < amount {
            return Err(PoolError::InsufficientContractLiquidity { token: Some(token) });
        }
        let balance = self.vault.transfer_out(token, &recipient, amount)?;
        warn!(target: ADMIN, %recipient, %token, %amount, reason, "emergency withdrawal");
        Ok(self.emit(
            vec![PoolEvent::EmergencyWithdraw {
                recipient,
                token,
                amount,
                reason: reason.to_string(),
            }],
            vec![StateChange::BalanceSet { token, balance }],
        ))
    }

    /// Admin recovery of every token the pool holds.
    pub fn emergency_withdraw_all(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
        reason: &str,
    ) -> Result<Receipt, PoolError> {
        logged(
            "emergency_withdraw_all",
            self.try_emergency_withdraw_all(ctx, recipient, reason),
        )
    }

    fn try_emergency_withdraw_all(
        &mut self,
        ctx: &CallContext,
        recipient: Address,
        reason: &str,
    ) -> Result<Receipt, PoolError> {
        self.check_admin(ctx, reason)?;
        let drained: Vec<(TokenId, Amount)> = self
            .vault
            .held_tokens()
            .into_iter()
            .map(|t| (t, self.vault.balance_of(t)))
            .filter(|(_, a)| !a.is_zero())
            .collect();
        if drained.is_empty() {
            return Err(PoolError::InsufficientContractLiquidity { token: None });
        }

        let mut events = Vec::with_capacity(drained.len());
        let mut changes = Vec::with_capacity(drained.len());
        for (token, amount) in drained {
            let balance = self.vault.transfer_out(token, &recipient, amount)?;
            warn!(target: ADMIN, %recipient, %token, %amount, reason, "emergency withdrawal (all)");
            events.push(PoolEvent::EmergencyWithdraw {
                recipient,
                token,
                amount,
                reason: reason.to_string(),
            });
            changes.push(StateChange::BalanceSet { token, balance });
        }
        Ok(self.emit(events, changes))
    }

    fn check_admin(&self, ctx: &CallContext, reason: &str) -> Result<(), PoolError> {
        if ctx.caller != self.admin {
            warn!(target: ADMIN, caller = %ctx.caller, "unauthorized emergency call");
            return Err(PoolError::Unauthorized);
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(PoolError::ReasonTooLong);
        }
        Ok(())
    }

    fn emit(&mut self, events: Vec<PoolEvent>, changes: Vec<StateChange>) -> Receipt {
        let first_seq = self.events.len() as u64;
        self.events.extend(events.iter().cloned());
        Receipt {
            first_seq,
            events,
            changes,
        }
    }

    // ---- views ----

    /// Current accumulator root (`getMerkleRoot`).
    pub fn merkle_root(&self) -> MerkleRoot {
        self.roots.current_root()
    }

    /// Whether a proof anchored to `root` would be accepted now.
    pub fn is_root_accepted(&self, root: &MerkleRoot) -> bool {
        self.roots.is_accepted(root)
    }

    /// Whether `commitment` is recorded (`commitments(bytes32)`).
    pub fn has_commitment(&self, commitment: &Commitment) -> bool {
        self.commitments.contains(commitment)
    }

    /// Leaf index of a recorded commitment.
    pub fn commitment_index(&self, commitment: &Commitment) -> Option<u64> {
        self.commitments.index_of(commitment)
    }

    /// Whether `nullifier` is spent (`nullifiers(bytes32)`).
    pub fn is_nullifier_used(&self, nullifier: &Nullifier) -> bool {
        self.nullifiers.contains(nullifier)
    }

    /// Whether the note behind `commitment` was withdrawn.
    pub fn is_note_spent(&self, commitment: &Commitment) -> bool {
        self.spent_notes.contains(commitment)
    }

    /// Whether `digest` names a settled trade claim.
    pub fn is_trade_settled(&self, digest: &Hash32) -> bool {
        self.trades.contains(digest)
    }

    /// Whether `depositor` could complete now.
    pub fn can_complete_deposit(&self, depositor: &Address) -> bool {
        self.deposit_phase(depositor) == DepositPhase::Funded
    }

    /// Slot of `depositor` (`getPendingDeposit`).
    pub fn pending_deposit(&self, depositor: &Address) -> Option<PendingDeposit> {
        self.pending.get(depositor).copied()
    }

    /// Explicit phase of `depositor`'s slot.
    pub fn deposit_phase(&self, depositor: &Address) -> DepositPhase {
        self.pending
            .phase(depositor, |token| self.vault.balance_of(token))
    }

    /// Pool balance of `token`.
    pub fn contract_balance(&self, token: TokenId) -> Amount {
        self.vault.balance_of(token)
    }

    /// Number of completed deposits.
    pub fn total_deposits(&self) -> u64 {
        self.commitments.len() as u64
    }

    /// Authentication path of the commitment at `leaf_index`.
    pub fn merkle_path(&self, leaf_index: u64) -> Option<MerklePath> {
        self.roots
            .tree()
            .path(self.commitments.leaves(), leaf_index)
    }

    /// Up to `limit` journaled events starting at sequence `from`.
    pub fn events(&self, from: u64, limit: usize) -> &[PoolEvent] {
        let start = (from as usize).min(self.events.len());
        let end = start.saturating_add(limit).min(self.events.len());
        &self.events[start..end]
    }

    /// Number of journaled events.
    pub fn event_count(&self) -> u64 {
        self.events.len() as u64
    }

    /// Admin authority.
    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Accepted compliance authority.
    pub fn compliance_authority(&self) -> Address {
        self.compliance_authority
    }

    /// Proof gate (verification keys and verifier).
    pub fn gate(&self) -> &ProofGate<V> {
        &self.gate
    }

    /// Mutable proof gate, for registering proofs on devnets.
    pub fn gate_mut(&mut self) -> &mut ProofGate<V> {
        &mut self.gate
    }

    /// Token vault.
    pub fn vault(&self) -> &T {
        &self.vault
    }

    /// Swap router.
    pub fn router(&self) -> &R {
        &self.router
    }

    /// Commitments in leaf order.
    pub fn commitments(&self) -> &[Commitment] {
        self.commitments.leaves()
    }

    /// Root register.
    pub fn roots(&self) -> &RootRegister {
        &self.roots
    }
}

fn logged(op: &'static str, r: Result<Receipt, PoolError>) -> Result<Receipt, PoolError> {
    if let Err(e) = &r {
        warn!(target: POOL, op, code = e.code(), error = %e, "rejected");
    }
    r
}
