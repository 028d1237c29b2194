//! Canonical serialization helpers.
//!
//! Rule: everything persisted by the node or the wallet is encoded with Borsh.
//! JSON is only used on the RPC surface; ABI only on the proof wire contract.

use crate::constants::*;
use crate::types::{CoreError, Hash32};
use borsh::to_vec;

/// Encode a value with canonical Borsh encoding.
pub fn to_bytes<T: borsh::BorshSerialize>(v: &T) -> Result<Vec<u8>, CoreError> {
    to_vec(v).map_err(|_| CoreError::InvalidValue("borsh serialization failed"))
}

/// Decode a Borsh-encoded value.
pub fn from_bytes<T: borsh::BorshDeserialize>(bytes: &[u8]) -> Result<T, CoreError> {
    borsh::from_slice(bytes).map_err(|_| CoreError::InvalidValue("borsh deserialization failed"))
}

/// Hash bytes with blake3 and return 32 bytes.
pub fn hash32(domain_sep: &[u8], bytes: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain_sep);
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(out.as_bytes());
    Hash32(arr)
}

/// Journal identifier of an event = BLAKE3(DS_EVENT || seq_be || borsh(event)).
pub fn event_id<T: borsh::BorshSerialize>(seq: u64, event: &T) -> Result<Hash32, CoreError> {
    let mut bytes = seq.to_be_bytes().to_vec();
    bytes.extend_from_slice(&to_bytes(event)?);
    Ok(hash32(DS_EVENT, &bytes))
}
