use std::path::Path;

use innocence_core::{
    from_bytes, to_bytes, Address, Amount, Commitment, CoreError, Hash32, Nullifier, PoolEvent, TokenId,
    PROTOCOL_VERSION,
};
use innocence_state::{
    BalanceDelta, LedgerVault, PendingDeposit, PoolConfig, PoolError, PoolParts, PrivacyPool,
    Receipt, ShadowBalanceRouter, StateChange, SwapRouter,
};
use innocence_verifier::{ProofKind, RegistryVerifier};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult, Transactional};
use thiserror::Error;
use tracing::{error, info};

// Pool rules live in innocence-state; this module only persists receipts and rebuilds on start.

const TREE_COMMITMENTS: &str = "commitments";
const TREE_COMMITMENT_INDEX: &str = "commitment_index";
const TREE_NULLIFIERS: &str = "nullifiers";
const TREE_SPENT_NOTES: &str = "spent_notes";
const TREE_TRADE_DIGESTS: &str = "trade_digests";
const TREE_PENDING: &str = "pending";
const TREE_BALANCES: &str = "balances";
const TREE_EVENTS: &str = "events";
const TREE_TRADES: &str = "trades";
const TREE_PROOFS: &str = "proofs";
const TREE_META: &str = "meta";
const KEY_VERSION: &[u8] = b"version";
const PRESENT: &[u8] = &[1];

/// The pool as run by the node.
pub type NodePool = PrivacyPool<RegistryVerifier, LedgerVault, ShadowBalanceRouter>;

/// Storage failures.
#[derive(Debug, Error)]
pub enum DbError {
    /// sled failed.
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    /// A nullifier in the receipt is already on disk.
    #[error("nullifier already spent on disk")]
    NullifierSpent,
    /// A commitment in the receipt is already on disk.
    #[error("commitment already stored")]
    DuplicateCommitment,
    /// A note in the receipt is already marked spent on disk.
    #[error("note already spent on disk")]
    NoteSpent,
    /// A trade digest in the receipt is already on disk.
    #[error("trade already settled on disk")]
    TradeSettled,
    /// A stored record does not decode.
    #[error("corrupt record in {0}")]
    Corrupt(&'static str),
    /// Encoding a record failed.
    #[error("encoding: {0}")]
    Encode(#[from] CoreError),
    /// Stored contents do not replay into a valid pool.
    #[error("replay failed: {0}")]
    Replay(PoolError),
}

/// Anything the node can reject a call with.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The pool rejected the operation.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Persisting or loading failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl NodeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::Pool(e) => e.code(),
            NodeError::Db(_) => "Storage",
        }
    }
}

/// Everything read back from disk.
#[derive(Default)]
pub struct Stored {
    /// Commitments, nullifiers, spent notes, trade digests, slots and events.
    pub parts: PoolParts,
    /// Non-zero token balances.
    pub balances: Vec<(TokenId, Amount)>,
    /// Settled trade deltas in event order.
    pub trades: Vec<BalanceDelta>,
    /// Registered proof digests.
    pub proofs: Vec<Hash32>,
}

enum Write {
    Commitment { key: [u8; 8], cm: Commitment },
    Nullifier(Nullifier),
    NoteSpent(Commitment),
    Pending { key: Address, value: Vec<u8> },
    Balance { key: [u8; 8], value: Option<Vec<u8>> },
    Trade { key: [u8; 8], digest: Hash32, value: Vec<u8> },
}

/// sled trees backing the pool.
pub struct PoolDb {
    db: sled::Db,
    commitments: sled::Tree,
    commitment_index: sled::Tree,
    nullifiers: sled::Tree,
    spent_notes: sled::Tree,
    trade_digests: sled::Tree,
    pending: sled::Tree,
    balances: sled::Tree,
    events: sled::Tree,
    trades: sled::Tree,
    proofs: sled::Tree,
    meta: sled::Tree,
}

impl PoolDb {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let db = sled::open(path)?;
        let commitments = db.open_tree(TREE_COMMITMENTS)?;
        let commitment_index = db.open_tree(TREE_COMMITMENT_INDEX)?;
        let nullifiers = db.open_tree(TREE_NULLIFIERS)?;
        let spent_notes = db.open_tree(TREE_SPENT_NOTES)?;
        let trade_digests = db.open_tree(TREE_TRADE_DIGESTS)?;
        let pending = db.open_tree(TREE_PENDING)?;
        let balances = db.open_tree(TREE_BALANCES)?;
        let events = db.open_tree(TREE_EVENTS)?;
        let trades = db.open_tree(TREE_TRADES)?;
        let proofs = db.open_tree(TREE_PROOFS)?;
        let meta = db.open_tree(TREE_META)?;
        if meta.get(KEY_VERSION)?.is_none() {
            meta.insert(KEY_VERSION, &PROTOCOL_VERSION.to_be_bytes()[..])?;
        }
        Ok(Self {
            db,
            commitments,
            commitment_index,
            nullifiers,
            spent_notes,
            trade_digests,
            pending,
            balances,
            events,
            trades,
            proofs,
            meta,
        })
    }

    /// Persist a receipt in one transaction across all pool trees.
    ///
    /// Nullifiers, spent notes and trade digests are inserted check-and-set:
    /// if one is already on disk the whole transaction aborts and nothing is
    /// written.
    pub fn commit(&self, receipt: &Receipt) -> Result<(), DbError> {
        let mut writes = Vec::with_capacity(receipt.changes.len());
        for change in &receipt.changes {
            writes.push(match change {
                StateChange::CommitmentAdded {
                    commitment,
                    leaf_index,
                } => Write::Commitment {
                    key: leaf_index.to_be_bytes(),
                    cm: *commitment,
                },
                StateChange::NullifierSpent { nullifier } => Write::Nullifier(*nullifier),
                StateChange::NoteSpent { commitment } => Write::NoteSpent(*commitment),
                StateChange::PendingDepositSet { depositor, deposit } => Write::Pending {
                    key: *depositor,
                    value: to_bytes(deposit)?,
                },
                StateChange::BalanceSet { token, balance } => Write::Balance {
                    key: token.0.to_be_bytes(),
                    value: if balance.is_zero() {
                        None
                    } else {
                        Some(to_bytes(balance)?)
                    },
                },
                StateChange::TradeRecorded { digest, delta } => Write::Trade {
                    key: receipt.first_seq.to_be_bytes(),
                    digest: *digest,
                    value: to_bytes(delta)?,
                },
            });
        }
        let mut events = Vec::with_capacity(receipt.events.len());
        for (i, ev) in receipt.events.iter().enumerate() {
            events.push(((receipt.first_seq + i as u64).to_be_bytes(), to_bytes(ev)?));
        }

        let res: TransactionResult<(), DbError> = (
            &self.commitments,
            &self.commitment_index,
            &self.nullifiers,
            &self.spent_notes,
            &self.trade_digests,
            &self.pending,
            &self.balances,
            &self.events,
            &self.trades,
        )
            .transaction(
                |(
                    commitments,
                    commitment_index,
                    nullifiers,
                    spent_notes,
                    trade_digests,
                    pending,
                    balances,
                    events_t,
                    trades,
                )| {
                    for w in &writes {
                        match w {
                            Write::Commitment { key, cm } => {
                                if commitment_index.get(cm.as_bytes())?.is_some() {
                                    return Err(ConflictableTransactionError::Abort(
                                        DbError::DuplicateCommitment,
                                    ));
                                }
                                commitments.insert(&key[..], &cm.as_bytes()[..])?;
                                commitment_index.insert(&cm.as_bytes()[..], &key[..])?;
                            }
                            Write::Nullifier(nf) => {
                                if nullifiers.get(nf.as_bytes())?.is_some() {
                                    return Err(ConflictableTransactionError::Abort(
                                        DbError::NullifierSpent,
                                    ));
                                }
                                nullifiers.insert(&nf.as_bytes()[..], PRESENT)?;
                            }
                            Write::NoteSpent(cm) => {
                                if spent_notes.get(cm.as_bytes())?.is_some() {
                                    return Err(ConflictableTransactionError::Abort(
                                        DbError::NoteSpent,
                                    ));
                                }
                                spent_notes.insert(&cm.as_bytes()[..], PRESENT)?;
                            }
                            Write::Pending { key, value } => {
                                pending.insert(&key.as_bytes()[..], value.clone())?;
                            }
                            Write::Balance { key, value } => match value {
                                Some(v) => {
                                    balances.insert(&key[..], v.clone())?;
                                }
                                None => {
                                    balances.remove(&key[..])?;
                                }
                            },
                            Write::Trade { key, digest, value } => {
                                if trade_digests.get(digest.as_bytes())?.is_some() {
                                    return Err(ConflictableTransactionError::Abort(
                                        DbError::TradeSettled,
                                    ));
                                }
                                trade_digests.insert(&digest.as_bytes()[..], PRESENT)?;
                                trades.insert(&key[..], value.clone())?;
                            }
                        }
                    }
                    for (key, value) in &events {
                        events_t.insert(&key[..], value.clone())?;
                    }
                    Ok(())
                },
            );

        match res {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(DbError::Sled(e)),
        }
    }

    /// Record a registered proof digest.
    pub fn insert_proof(&self, digest: &Hash32) -> Result<(), DbError> {
        self.proofs.insert(&digest.as_bytes()[..], PRESENT)?;
        Ok(())
    }

    /// Read everything back, commitments in leaf order.
    pub fn load(&self) -> Result<Stored, DbError> {
        let mut out = Stored::default();

        for (expected, item) in self.commitments.iter().enumerate() {
            let (k, v) = item?;
            let index = u64::from_be_bytes(fixed(&k, TREE_COMMITMENTS)?);
            if index != expected as u64 {
                return Err(DbError::Corrupt(TREE_COMMITMENTS));
            }
            out.parts
                .commitments
                .push(Commitment(fixed(&v, TREE_COMMITMENTS)?));
        }
        for item in self.nullifiers.iter() {
            let (k, _) = item?;
            out.parts
                .nullifiers
                .push(Nullifier(fixed(&k, TREE_NULLIFIERS)?));
        }
        for item in self.spent_notes.iter() {
            let (k, _) = item?;
            out.parts
                .spent_notes
                .push(Commitment(fixed(&k, TREE_SPENT_NOTES)?));
        }
        for item in self.trade_digests.iter() {
            let (k, _) = item?;
            out.parts
                .trade_digests
                .push(Hash32(fixed(&k, TREE_TRADE_DIGESTS)?));
        }
        for item in self.pending.iter() {
            let (k, v) = item?;
            let who = Address(fixed(&k, TREE_PENDING)?);
            let d = from_bytes::<PendingDeposit>(&v).map_err(|_| DbError::Corrupt(TREE_PENDING))?;
            out.parts.pending.push((who, d));
        }
        for item in self.events.iter() {
            let (_, v) = item?;
            let ev = from_bytes::<PoolEvent>(&v).map_err(|_| DbError::Corrupt(TREE_EVENTS))?;
            out.parts.events.push(ev);
        }
        for item in self.balances.iter() {
            let (k, v) = item?;
            let token = TokenId(u64::from_be_bytes(fixed(&k, TREE_BALANCES)?));
            let amount = from_bytes::<Amount>(&v).map_err(|_| DbError::Corrupt(TREE_BALANCES))?;
            out.balances.push((token, amount));
        }
        for item in self.trades.iter() {
            let (_, v) = item?;
            let delta = from_bytes::<BalanceDelta>(&v).map_err(|_| DbError::Corrupt(TREE_TRADES))?;
            out.trades.push(delta);
        }
        for item in self.proofs.iter() {
            let (k, _) = item?;
            out.proofs.push(Hash32(fixed(&k, TREE_PROOFS)?));
        }
        Ok(out)
    }

    /// Flush to disk.
    pub fn flush(&self) -> Result<(), DbError> {
        self.db.flush()?;
        Ok(())
    }

    /// Stored protocol version.
    pub fn version(&self) -> Result<Option<u16>, DbError> {
        Ok(match self.meta.get(KEY_VERSION)? {
            Some(v) => Some(u16::from_be_bytes(fixed(&v, TREE_META)?)),
            None => None,
        })
    }
}

fn fixed<const N: usize>(bytes: &[u8], tree: &'static str) -> Result<[u8; N], DbError> {
    bytes.try_into().map_err(|_| DbError::Corrupt(tree))
}

/// The in-memory pool and its database, kept in lockstep.
pub struct PoolStore {
    pool: NodePool,
    db: PoolDb,
    config: PoolConfig,
    always_valid: bool,
}

impl PoolStore {
    /// Open the database at `path` and rebuild the pool from it.
    pub fn load_or_init(path: &Path, config: PoolConfig, always_valid: bool) -> Result<Self, NodeError> {
        let db = PoolDb::open(path)?;
        let pool = rebuild(&db, &config, always_valid)?;
        info!(
            commitments = pool.total_deposits(),
            events = pool.event_count(),
            root = %pool.merkle_root(),
            "pool loaded"
        );
        Ok(Self {
            pool,
            db,
            config,
            always_valid,
        })
    }

    /// Read access to the pool.
    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Run a state-changing operation and persist its receipt.
    ///
    /// If persisting fails the pool is rebuilt from disk, so memory never runs
    /// ahead of the database.
    pub fn apply<F>(&mut self, op: F) -> Result<Receipt, NodeError>
    where
        F: FnOnce(&mut NodePool) -> Result<Receipt, PoolError>,
    {
        let receipt = op(&mut self.pool)?;
        if let Err(e) = self.db.commit(&receipt) {
            error!(error = %e, "persisting receipt failed, rebuilding pool from disk");
            self.pool = rebuild(&self.db, &self.config, self.always_valid)?;
            return Err(e.into());
        }
        Ok(receipt)
    }

    /// Admin-only: register a proof with the devnet verifier.
    pub fn register_valid_proof(
        &mut self,
        caller: &Address,
        kind: ProofKind,
        public_values: &[u8],
        proof: &[u8],
    ) -> Result<Hash32, NodeError> {
        if caller != &self.config.admin {
            return Err(PoolError::Unauthorized.into());
        }
        let vk = *self.pool.gate().keys().for_kind(kind);
        let digest = RegistryVerifier::digest(&vk, public_values, proof);
        self.db.insert_proof(&digest)?;
        self.pool
            .gate_mut()
            .verifier_mut()
            .register_digest(digest);
        info!(target: "innocence::admin", %kind, %digest, "proof registered");
        Ok(digest)
    }

    /// Flush the database.
    pub fn flush(&self) -> Result<(), NodeError> {
        Ok(self.db.flush()?)
    }

    #[cfg(test)]
    pub(crate) fn db(&self) -> &PoolDb {
        &self.db
    }
}

fn rebuild(db: &PoolDb, config: &PoolConfig, always_valid: bool) -> Result<NodePool, NodeError> {
    let stored = db.load()?;
    let mut verifier = RegistryVerifier::new();
    verifier.set_always_valid(always_valid);
    for digest in stored.proofs {
        verifier.register_digest(digest);
    }
    let vault = LedgerVault::with_balances(stored.balances);
    let mut router = ShadowBalanceRouter::new();
    for delta in &stored.trades {
        router.settle(delta);
    }
    PrivacyPool::from_parts(config.clone(), verifier, vault, router, stored.parts)
        .map_err(|e| DbError::Replay(e).into())
}
