#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Innocence wallet: notes and a signing key encrypted at rest, plus a client
//! for the node RPC.

use std::fmt;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use argon2::{password_hash::SaltString, Argon2};
use borsh::{BorshDeserialize, BorshSerialize};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use innocence_core::{
    compute_commitment, nullifier_hash, Address, Commitment, Nullifier, TokenId, DS_NOTE, DS_RPC,
};
use innocence_node::address_of;
use k256::ecdsa::SigningKey;
use k256::EncodedPoint;
use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

pub mod rpc_client;
pub use rpc_client::{RpcClient, RpcFailure};

const TREE_NOTES: &str = "notes";
const TREE_KEYS: &str = "keys";
const KEY_SIGNER: &[u8] = b"signer";

fn argon2_params() -> Argon2<'static> {
    Argon2::default()
}

/// A shielded note. Secrets are wiped on drop.
pub struct Note {
    /// Token the note is denominated in.
    pub token: TokenId,
    /// Deposited amount.
    pub amount: u64,
    /// Commitment secret.
    pub secret: [u8; 32],
    /// Nullifier preimage.
    pub nullifier: [u8; 32],
}

impl Note {
    /// Fresh note with random secrets.
    pub fn generate(token: TokenId, amount: u64) -> Self {
        let mut secret = [0u8; 32];
        let mut nullifier = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        OsRng.fill_bytes(&mut nullifier);
        Self {
            token,
            amount,
            secret,
            nullifier,
        }
    }

    /// Commitment recorded in the pool at deposit.
    pub fn commitment(&self) -> Commitment {
        compute_commitment(&self.secret, &self.nullifier)
    }

    /// Nullifier hash revealed at withdrawal.
    pub fn nullifier_hash(&self) -> Nullifier {
        nullifier_hash(&self.nullifier)
    }

    fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(64));
        out.extend_from_slice(&self.secret);
        out.extend_from_slice(&self.nullifier);
        out
    }
}

impl Drop for Note {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.nullifier.zeroize();
    }
}

/// Where a note is in its lifecycle.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteStatus {
    /// Created locally, not yet in the pool.
    Pending,
    /// Commitment recorded in the pool.
    Deposited,
    /// Nullifier consumed by a withdrawal.
    Spent,
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoteStatus::Pending => "pending",
            NoteStatus::Deposited => "deposited",
            NoteStatus::Spent => "spent",
        };
        f.write_str(s)
    }
}

/// Password-sealed note secrets.
#[derive(BorshSerialize, BorshDeserialize, Clone)]
pub struct EncryptedSecrets {
    /// Argon2 salt (b64).
    pub salt: Vec<u8>,
    /// XChaCha20 nonce.
    pub nonce: Vec<u8>,
    /// Sealed `secret || nullifier`.
    pub ciphertext: Vec<u8>,
}

/// Stored note: public metadata in clear, secrets sealed.
#[derive(BorshSerialize, BorshDeserialize, Clone)]
pub struct NoteRecord {
    /// Note commitment (also the storage key).
    pub commitment: Commitment,
    /// Token.
    pub token: TokenId,
    /// Amount.
    pub amount: u64,
    /// Lifecycle status.
    pub status: NoteStatus,
    /// Leaf index once deposited.
    pub leaf_index: Option<u64>,
    /// Sealed secrets.
    pub enc: EncryptedSecrets,
}

/// Stored signing key: address and public key in clear, private key sealed.
#[derive(BorshSerialize, BorshDeserialize, Clone)]
pub struct KeyRecord {
    /// Address the node sees as the caller.
    pub address: Address,
    /// SEC1 public key.
    pub pubkey: Vec<u8>,
    /// Sealed private key.
    pub enc: EncryptedSecrets,
}

/// Note and key store backed by sled.
pub struct Wallet {
    db: sled::Db,
    notes: sled::Tree,
    keys: sled::Tree,
}

impl Wallet {
    /// Open (or create) the wallet database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        let notes = db.open_tree(TREE_NOTES)?;
        let keys = db.open_tree(TREE_KEYS)?;
        Ok(Self { db, notes, keys })
    }

    /// Generate and seal the wallet's signing key.
    pub fn init(&self, password: &str) -> Result<Address> {
        if self.keys.get(KEY_SIGNER)?.is_some() {
            bail!("wallet already initialized");
        }
        let key = SigningKey::random(&mut OsRng);
        let address = address_of(key.verifying_key());
        let pubkey = EncodedPoint::from(key.verifying_key()).as_bytes().to_vec();
        let enc = seal(&key.to_bytes(), &key_aad(&address), password)?;
        let record = KeyRecord {
            address,
            pubkey,
            enc,
        };
        self.keys.insert(KEY_SIGNER, borsh::to_vec(&record)?)?;
        Ok(address)
    }

    /// The stored signing key record.
    pub fn key(&self) -> Result<KeyRecord> {
        let bytes = self
            .keys
            .get(KEY_SIGNER)?
            .ok_or_else(|| anyhow!("wallet not initialized"))?;
        Ok(KeyRecord::try_from_slice(&bytes)?)
    }

    /// Address the wallet acts as on the pool.
    pub fn address(&self) -> Result<Address> {
        Ok(self.key()?.address)
    }

    /// Unseal the signing key.
    pub fn signer(&self, password: &str) -> Result<SigningKey> {
        let rec = self.key()?;
        let plain = unseal(&rec.enc, &key_aad(&rec.address), password)?;
        let key = SigningKey::from_slice(&plain).map_err(|e| anyhow!(e.to_string()))?;
        if address_of(key.verifying_key()) != rec.address {
            bail!("sealed key does not match {}", rec.address);
        }
        Ok(key)
    }

    /// Create, seal and store a fresh note.
    pub fn new_note(&self, token: TokenId, amount: u64, password: &str) -> Result<NoteRecord> {
        if amount == 0 {
            bail!("note amount must be non-zero");
        }
        let note = Note::generate(token, amount);
        let commitment = note.commitment();
        let enc = seal(&note.secret_bytes(), &note_aad(&commitment), password)?;
        let record = NoteRecord {
            commitment,
            token,
            amount,
            status: NoteStatus::Pending,
            leaf_index: None,
            enc,
        };
        self.put(&record)?;
        Ok(record)
    }

    /// Look up a note by commitment.
    pub fn get(&self, commitment: &Commitment) -> Result<NoteRecord> {
        let bytes = self
            .notes
            .get(commitment.as_bytes())?
            .ok_or_else(|| anyhow!("note {commitment} not in wallet"))?;
        Ok(NoteRecord::try_from_slice(&bytes)?)
    }

    /// All notes.
    pub fn list(&self) -> Result<Vec<NoteRecord>> {
        let mut out = Vec::new();
        for item in self.notes.iter() {
            let (_, v) = item?;
            out.push(NoteRecord::try_from_slice(&v)?);
        }
        Ok(out)
    }

    /// Decrypt a note's secrets.
    pub fn reveal(&self, commitment: &Commitment, password: &str) -> Result<Note> {
        let rec = self.get(commitment)?;
        let plain = unseal(&rec.enc, &note_aad(commitment), password)?;
        if plain.len() != 64 {
            bail!("sealed note has wrong length");
        }
        let mut note = Note {
            token: rec.token,
            amount: rec.amount,
            secret: [0u8; 32],
            nullifier: [0u8; 32],
        };
        note.secret.copy_from_slice(&plain[..32]);
        note.nullifier.copy_from_slice(&plain[32..]);
        if note.commitment() != *commitment {
            bail!("sealed secrets do not open to {commitment}");
        }
        Ok(note)
    }

    /// Pending -> Deposited.
    pub fn mark_deposited(&self, commitment: &Commitment, leaf_index: Option<u64>) -> Result<()> {
        let mut rec = self.get(commitment)?;
        if rec.status != NoteStatus::Pending {
            bail!("note {commitment} is {}, expected pending", rec.status);
        }
        rec.status = NoteStatus::Deposited;
        rec.leaf_index = leaf_index;
        self.put(&rec)
    }

    /// Deposited -> Spent.
    pub fn mark_spent(&self, commitment: &Commitment) -> Result<()> {
        let mut rec = self.get(commitment)?;
        if rec.status != NoteStatus::Deposited {
            bail!("note {commitment} is {}, expected deposited", rec.status);
        }
        rec.status = NoteStatus::Spent;
        self.put(&rec)
    }

    /// Flush to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn put(&self, rec: &NoteRecord) -> Result<()> {
        self.notes
            .insert(&rec.commitment.as_bytes()[..], borsh::to_vec(rec)?)?;
        Ok(())
    }
}

// Associated data binds a sealed blob to the note or key it belongs to.
fn note_aad(commitment: &Commitment) -> Vec<u8> {
    let mut aad = Vec::with_capacity(DS_NOTE.len() + 32);
    aad.extend_from_slice(DS_NOTE);
    aad.extend_from_slice(commitment.as_bytes());
    aad
}

fn key_aad(address: &Address) -> Vec<u8> {
    let mut aad = Vec::with_capacity(DS_RPC.len() + 20);
    aad.extend_from_slice(DS_RPC);
    aad.extend_from_slice(address.as_bytes());
    aad
}

fn derive_key(password: &str, salt: &SaltString) -> Result<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    let salt_binding = salt.as_salt();
    let salt_bytes = salt_binding.as_ref().as_bytes();
    argon2_params()
        .hash_password_into(password.as_bytes(), salt_bytes, &mut key[..])
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(key)
}

fn seal(plain: &[u8], aad: &[u8], password: &str) -> Result<EncryptedSecrets> {
    let salt = SaltString::generate(&mut OsRng);
    let key = derive_key(password, &salt)?;
    let cipher = XChaCha20Poly1305::new((&*key).into());
    let mut nonce = [0u8; 24];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: plain, aad })
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(EncryptedSecrets {
        salt: salt.as_str().as_bytes().to_vec(),
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

fn unseal(enc: &EncryptedSecrets, aad: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    let salt_str = std::str::from_utf8(&enc.salt)?;
    let salt = SaltString::from_b64(salt_str).map_err(|e| anyhow!(e.to_string()))?;
    let key = derive_key(password, &salt)?;
    let cipher = XChaCha20Poly1305::new((&*key).into());
    if enc.nonce.len() != 24 {
        bail!("bad nonce length");
    }
    let plain = cipher
        .decrypt(
            XNonce::from_slice(&enc.nonce),
            Payload {
                msg: &enc.ciphertext,
                aad,
            },
        )
        .map_err(|_| anyhow!("wrong password or corrupt record"))?;
    Ok(Zeroizing::new(plain))
}
