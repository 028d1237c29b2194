//! Signed RPC requests.
//!
//! State-changing calls carry `expires`, `pubkey` (SEC1 hex) and `signature`
//! (64-byte compact ECDSA over secp256k1, hex). The signature covers the
//! domain-separated JSON of every other field except `auth`. The caller the
//! pool sees is the Ethereum-style address of the signing key; nothing the
//! client claims about its identity is trusted.
//!
//! A request is valid from signing until `expires`, at most
//! [`MAX_REQUEST_TTL_SECS`] ahead of the node clock, and is accepted once.

use std::collections::HashMap;

use innocence_core::{hash32, Address, Hash32, DS_RPC, MAX_REQUEST_TTL_SECS};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::EncodedPoint;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use thiserror::Error;
use time::OffsetDateTime;

const UNSIGNED_FIELDS: [&str; 3] = ["auth", "pubkey", "signature"];

/// Why a request was not authenticated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The request is not a JSON object.
    #[error("request must be a json object")]
    NotAnObject,
    /// Signature fields are missing.
    #[error("request must be signed")]
    Unsigned,
    /// The public key does not parse.
    #[error("bad public key")]
    BadKey,
    /// The signature does not verify.
    #[error("bad signature")]
    BadSignature,
    /// `expires` is in the past or too far ahead.
    #[error("request expired or expiry too far ahead")]
    Expired,
    /// The same request was already accepted.
    #[error("request already accepted")]
    Replayed,
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotAnObject => "BadRequest",
            AuthError::Unsigned | AuthError::BadKey | AuthError::BadSignature => "Unauthorized",
            AuthError::Expired => "RequestExpired",
            AuthError::Replayed => "RequestReplayed",
        }
    }
}

/// Seconds since the epoch on the node clock.
pub fn unix_now() -> u64 {
    u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0)
}

/// Ethereum-style address of a secp256k1 key: the last 20 bytes of the
/// keccak256 of its uncompressed point.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

/// Bytes a request signature covers.
pub fn signing_bytes(request: &Value) -> Result<Vec<u8>, AuthError> {
    let mut body = request.as_object().ok_or(AuthError::NotAnObject)?.clone();
    for field in UNSIGNED_FIELDS {
        body.remove(field);
    }
    // serde_json maps are ordered by key, so this encoding is canonical.
    let mut out = DS_RPC.to_vec();
    out.extend_from_slice(Value::Object(body).to_string().as_bytes());
    Ok(out)
}

/// Stamp `expires` on `request` and sign it with `key`.
pub fn sign_request(key: &SigningKey, request: &mut Value, expires: u64) -> Result<(), AuthError> {
    let obj = request.as_object_mut().ok_or(AuthError::NotAnObject)?;
    for field in UNSIGNED_FIELDS {
        obj.remove(field);
    }
    obj.insert("expires".into(), json!(expires));
    let msg = signing_bytes(request)?;
    let sig: Signature = key.sign(&msg);
    let pubkey = EncodedPoint::from(key.verifying_key());
    request["pubkey"] = json!(hex::encode(pubkey.as_bytes()));
    request["signature"] = json!(hex::encode(sig.to_bytes()));
    Ok(())
}

/// Verifies signed requests and remembers accepted ones until they expire.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: HashMap<Hash32, u64>,
}

impl ReplayGuard {
    /// Empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the signature and freshness of `request` at `now` and return the
    /// signer's address. A request is accepted at most once.
    pub fn authenticate(&mut self, request: &Value, now: u64) -> Result<Address, AuthError> {
        let pubkey = hex_field(request, "pubkey")?;
        let sig = hex_field(request, "signature")?;
        let expires = request
            .get("expires")
            .and_then(Value::as_u64)
            .ok_or(AuthError::Unsigned)?;
        if expires < now || expires > now.saturating_add(MAX_REQUEST_TTL_SECS) {
            return Err(AuthError::Expired);
        }

        let key = VerifyingKey::from_sec1_bytes(&pubkey).map_err(|_| AuthError::BadKey)?;
        let sig = Signature::from_slice(&sig).map_err(|_| AuthError::BadSignature)?;
        let msg = signing_bytes(request)?;
        key.verify(&msg, &sig).map_err(|_| AuthError::BadSignature)?;

        // Keyed on the signed bytes, not the signature, so a re-encoded
        // signature over the same request is still a replay.
        let digest = hash32(DS_RPC, &msg);
        self.seen.retain(|_, until| *until >= now);
        if self.seen.contains_key(&digest) {
            return Err(AuthError::Replayed);
        }
        self.seen.insert(digest, expires);
        Ok(address_of(&key))
    }

    /// Number of remembered requests.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn hex_field(request: &Value, key: &str) -> Result<Vec<u8>, AuthError> {
    let s = request
        .get(key)
        .and_then(Value::as_str)
        .ok_or(AuthError::Unsigned)?;
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| match key {
        "pubkey" => AuthError::BadKey,
        _ => AuthError::BadSignature,
    })
}
