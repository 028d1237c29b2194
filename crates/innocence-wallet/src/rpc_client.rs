use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use anyhow::{anyhow, Result};
use innocence_core::{Address, Amount, Commitment, Hash32, Nullifier, TokenId};
use innocence_node::{sign_request, unix_now};
use innocence_state::MerklePath;
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use thiserror::Error;

const REQUEST_TTL_SECS: u64 = 60;

/// The node answered `ok: false`.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct RpcFailure {
    /// Machine-readable code, e.g. `DoubleSpend`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// JSON-lines client for the node RPC.
pub struct RpcClient {
    addr: String,
    auth: Option<String>,
}

impl RpcClient {
    /// Client for the node at `addr`.
    pub fn new(addr: &str, auth: Option<String>) -> Self {
        Self {
            addr: addr.to_string(),
            auth,
        }
    }

    fn send(&self, req: Value) -> Result<Value> {
        let mut stream = TcpStream::connect(&self.addr)?;
        let mut req = req;
        if let Some(token) = &self.auth {
            req["auth"] = json!(token);
        }
        let line = req.to_string();
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        let mut reader = BufReader::new(stream);
        let mut resp = String::new();
        reader.read_line(&mut resp)?;
        let v: Value = serde_json::from_str(&resp)?;
        Ok(v)
    }

    /// Call `method` with `params` (a JSON object). Node-side rejections come
    /// back as [`RpcFailure`].
    pub fn call(&self, method: &str, params: Value) -> Result<Value> {
        let mut req = if params.is_object() { params } else { json!({}) };
        req["method"] = json!(method);
        let v = self.send(req)?;
        if v.get("ok").and_then(|o| o.as_bool()) != Some(true) {
            let field = |k: &str| v.get(k).and_then(|e| e.as_str()).unwrap_or("").to_string();
            return Err(RpcFailure {
                code: field("code"),
                message: field("error"),
            }
            .into());
        }
        Ok(v)
    }

    /// Current accumulator root.
    pub fn merkle_root(&self) -> Result<Hash32> {
        let v = self.call("get_merkle_root", json!({}))?;
        Ok(str_field(&v, "root")?.parse()?)
    }

    /// Leaf index of `commitment`, if recorded.
    pub fn commitment_index(&self, commitment: &Commitment) -> Result<Option<u64>> {
        let v = self.call("has_commitment", json!({ "commitment": commitment.to_hex() }))?;
        Ok(v.get("leaf_index").and_then(|i| i.as_u64()))
    }

    /// Whether `nullifier` has been spent.
    pub fn is_nullifier_used(&self, nullifier: &Nullifier) -> Result<bool> {
        let v = self.call("is_nullifier_used", json!({ "nullifier": nullifier.to_hex() }))?;
        v.get("used")
            .and_then(|u| u.as_bool())
            .ok_or_else(|| anyhow!("missing used"))
    }

    /// Phase of `depositor`'s deposit slot.
    pub fn deposit_phase(&self, depositor: &Address) -> Result<String> {
        let v = self.call("get_deposit_phase", json!({ "depositor": depositor.to_hex() }))?;
        Ok(str_field(&v, "phase")?.to_string())
    }

    /// Authentication path for a recorded commitment.
    pub fn merkle_path(&self, commitment: &Commitment) -> Result<(MerklePath, Hash32)> {
        let v = self.call("get_merkle_path", json!({ "commitment": commitment.to_hex() }))?;
        let path = serde_json::from_value(v.get("path").cloned().unwrap_or(Value::Null))?;
        Ok((path, str_field(&v, "root")?.parse()?))
    }

    /// Sign `params` with `signer` and call `method`. The node takes the
    /// caller from the signature.
    pub fn call_signed(&self, method: &str, params: Value, signer: &SigningKey) -> Result<Value> {
        let mut req = if params.is_object() { params } else { json!({}) };
        req["method"] = json!(method);
        sign_request(signer, &mut req, unix_now() + REQUEST_TTL_SECS)?;
        self.call(method, req)
    }

    /// Stage a deposit.
    pub fn prepare_deposit(&self, signer: &SigningKey, token: TokenId, amount: u64) -> Result<Value> {
        self.call_signed(
            "prepare_deposit",
            json!({ "token": token.0, "amount": amount }),
            signer,
        )
    }

    /// Move value into the pool.
    pub fn transfer_to_pool(&self, signer: &SigningKey, token: TokenId, amount: u64) -> Result<Value> {
        self.call_signed(
            "transfer_to_pool",
            json!({ "token": token.0, "amount": amount.to_string() }),
            signer,
        )
    }

    /// Complete a funded deposit with a compliance proof.
    pub fn complete_deposit(
        &self,
        signer: &SigningKey,
        commitment: &Commitment,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Value> {
        self.call_signed(
            "complete_deposit",
            json!({
                "commitment": commitment.to_hex(),
                "proof": hex::encode(proof),
                "public_values": hex::encode(public_values),
            }),
            signer,
        )
    }

    /// Spend a note with a balance proof.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw(
        &self,
        signer: &SigningKey,
        nullifier: &Nullifier,
        recipient: &Address,
        token: TokenId,
        amount: Amount,
        proof: &[u8],
        public_values: &[u8],
    ) -> Result<Value> {
        self.call_signed(
            "withdraw",
            json!({
                "nullifier": nullifier.to_hex(),
                "recipient": recipient.to_hex(),
                "token": token.0,
                "amount": amount.to_string(),
                "proof": hex::encode(proof),
                "public_values": hex::encode(public_values),
            }),
            signer,
        )
    }

    /// Whether the note behind `commitment` was withdrawn.
    pub fn is_note_spent(&self, commitment: &Commitment) -> Result<bool> {
        let v = self.call("is_note_spent", json!({ "commitment": commitment.to_hex() }))?;
        v.get("spent")
            .and_then(|u| u.as_bool())
            .ok_or_else(|| anyhow!("missing spent"))
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Result<&'a str> {
    v.get(key)
        .and_then(|s| s.as_str())
        .ok_or_else(|| anyhow!("missing {key} in response"))
}
