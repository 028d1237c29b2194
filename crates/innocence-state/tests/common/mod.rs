#![allow(dead_code)]

use innocence_core::{
    compute_commitment, nullifier_hash, Address, Amount, BalancePublicValues, Commitment,
    CompliancePublicValues, Hash32, MerkleRoot, Nullifier, OwnershipPublicValues, TokenId,
    TradePublicValues, U256,
};
use innocence_state::{
    CallContext, LedgerVault, PoolConfig, PrivacyPool, Receipt, RootPolicy, ShadowBalanceRouter,
};
use innocence_verifier::{ProofKind, RegistryVerifier, VerifyingKeys};

pub type TestPool = PrivacyPool<RegistryVerifier, LedgerVault, ShadowBalanceRouter>;

pub const HYPE: TokenId = TokenId(150);
pub const USDC: TokenId = TokenId(0);
pub const PROOF: &[u8] = b"sp1-proof";
pub const NOW: u64 = 1_700_000_000;

pub fn admin() -> Address {
    Address([0xad; 20])
}

pub fn authority() -> Address {
    Address([0xca; 20])
}

pub fn user(n: u8) -> Address {
    Address([n; 20])
}

pub fn ctx(caller: Address) -> CallContext {
    CallContext {
        caller,
        timestamp: NOW,
    }
}

pub fn pool_with(policy: RootPolicy) -> TestPool {
    let config = PoolConfig {
        admin: admin(),
        compliance_authority: authority(),
        root_policy: policy,
        keys: VerifyingKeys::devnet(),
    };
    PrivacyPool::new(config, RegistryVerifier::new(), LedgerVault::new(), ShadowBalanceRouter::new())
}

pub fn pool() -> TestPool {
    pool_with(RootPolicy::CurrentOnly)
}

/// A client-side note.
#[derive(Clone, Copy, Debug)]
pub struct Note {
    pub secret: [u8; 32],
    pub nullifier: [u8; 32],
}

impl Note {
    pub fn new(n: u8) -> Self {
        Self {
            secret: [n; 32],
            nullifier: [n.wrapping_add(128); 32],
        }
    }

    pub fn commitment(&self) -> Commitment {
        compute_commitment(&self.secret, &self.nullifier)
    }

    pub fn nullifier_hash(&self) -> Nullifier {
        nullifier_hash(&self.nullifier)
    }
}

/// Register `pv` as validly proven for `kind` and return it.
pub fn prove(pool: &mut TestPool, kind: ProofKind, pv: Vec<u8>) -> Vec<u8> {
    let vk = *pool.gate().keys().for_kind(kind);
    pool.gate_mut().verifier_mut().register_valid_proof(&vk, &pv, PROOF);
    pv
}

pub fn compliance_pv(commitment: Commitment) -> Vec<u8> {
    CompliancePublicValues {
        commitment,
        compliance_authority: authority(),
        valid_until: U256::from(NOW + 3_600),
        certificate_hash: Hash32([0xce; 32]),
    }
    .encode()
}

pub fn balance_pv(commitment: Commitment, root: MerkleRoot, min: u64, asset: TokenId) -> Vec<u8> {
    BalancePublicValues {
        commitment,
        merkle_root: root,
        min_balance: Amount::from_u64(min),
        asset_id: asset,
    }
    .encode()
}

pub fn trade_pv(commitment: Commitment, from: TokenId, to: TokenId, amount: u64, min_to: u64, root: Option<MerkleRoot>) -> Vec<u8> {
    TradePublicValues {
        commitment,
        from_asset: from,
        to_asset: to,
        from_amount: Amount::from_u64(amount),
        min_to_amount: Amount::from_u64(min_to),
        merkle_root: root,
    }
    .encode()
}

pub fn ownership_pv(note: &Note) -> Vec<u8> {
    OwnershipPublicValues {
        commitment: note.commitment(),
        nullifier_hash: note.nullifier_hash(),
    }
    .encode()
}

/// Prepare, fund and complete a deposit of `amount` HYPE for `who`.
pub fn deposit(pool: &mut TestPool, who: Address, note: &Note, amount: u64) -> Receipt {
    pool.prepare_deposit(&ctx(who), HYPE, amount).expect("prepare");
    pool.transfer_to_pool(&ctx(who), HYPE, Amount::from_u64(amount))
        .expect("fund");
    let pv = prove(pool, ProofKind::Compliance, compliance_pv(note.commitment()));
    pool.complete_deposit(&ctx(who), note.commitment(), PROOF, &pv)
        .expect("complete")
}

/// Everything observable about a pool, for before/after comparisons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub root: MerkleRoot,
    pub commitments: Vec<Commitment>,
    pub events: u64,
    pub hype: Amount,
    pub usdc: Amount,
    pub trades: usize,
    pub pending: Vec<Option<innocence_state::PendingDeposit>>,
    pub spent: Vec<bool>,
    pub notes_spent: Vec<bool>,
}

pub fn snapshot(pool: &TestPool, notes: &[Note]) -> Snapshot {
    Snapshot {
        root: pool.merkle_root(),
        commitments: pool.commitments().to_vec(),
        events: pool.event_count(),
        hype: pool.contract_balance(HYPE),
        usdc: pool.contract_balance(USDC),
        trades: pool.router().trade_count(),
        pending: (0..8u8).map(|n| pool.pending_deposit(&user(n))).collect(),
        spent: notes
            .iter()
            .map(|n| pool.is_nullifier_used(&n.nullifier_hash()))
            .collect(),
        notes_spent: notes
            .iter()
            .map(|n| pool.is_note_spent(&n.commitment()))
            .collect(),
    }
}
