use std::fmt::Display;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::thread;

use innocence_core::{event_id, Address, Amount, Commitment, CoreError, Hash32, Nullifier, TokenId};
use innocence_state::{CallContext, DepositPhase, PendingDeposit, Receipt};
use innocence_verifier::ProofKind;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::{unix_now, AuthError, ReplayGuard};
use crate::pool_store::{NodeError, PoolStore};

const DEFAULT_EVENT_LIMIT: usize = 100;
const MAX_EVENT_LIMIT: usize = 1000;

/// Bind `addr` and serve JSON-lines requests, one thread per client.
pub fn serve_rpc(
    addr: &str,
    auth_token: Option<String>,
    store: Arc<Mutex<PoolStore>>,
) -> std::io::Result<thread::JoinHandle<()>> {
    let listener = TcpListener::bind(addr)?;
    Ok(serve_listener(listener, auth_token, store))
}

/// Serve on an already bound listener.
pub fn serve_listener(
    listener: TcpListener,
    auth_token: Option<String>,
    store: Arc<Mutex<PoolStore>>,
) -> thread::JoinHandle<()> {
    let addr = listener.local_addr().ok();
    info!(?addr, auth = auth_token.is_some(), "rpc listening");
    let auth = Arc::new(RpcAuth::new(auth_token));
    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let store = Arc::clone(&store);
                    let auth = Arc::clone(&auth);
                    thread::spawn(move || handle_client(stream, &auth, &store));
                }
                Err(e) => warn!(error = %e, "rpc accept failed"),
            }
        }
    })
}

/// Transport token and signed-request guard shared by all connections.
#[derive(Debug, Default)]
pub struct RpcAuth {
    token: Option<String>,
    guard: Mutex<ReplayGuard>,
}

impl RpcAuth {
    /// Require `token` in the `auth` field, if set.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            guard: Mutex::new(ReplayGuard::new()),
        }
    }

    fn token_ok(&self, v: &Value) -> bool {
        match &self.token {
            None => true,
            Some(expected) => v.get("auth").and_then(|a| a.as_str()) == Some(expected.as_str()),
        }
    }

    fn context(&self, v: &Value, now: u64) -> Result<CallContext, RpcError> {
        let mut guard = self.guard.lock().map_err(|_| RpcError {
            code: "Internal",
            message: "auth lock poisoned".into(),
        })?;
        let caller = guard.authenticate(v, now)?;
        Ok(CallContext {
            caller,
            timestamp: now,
        })
    }
}

fn handle_client(stream: TcpStream, auth: &RpcAuth, store: &Mutex<PoolStore>) {
    let peer = stream.peer_addr().ok();
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;
    let mut line = String::new();
    while let Ok(n) = reader.read_line(&mut line) {
        if n == 0 {
            break;
        }
        let resp = match serde_json::from_str::<Value>(&line) {
            Ok(v) => handle_request(v, auth, store),
            Err(_) => json!({"ok": false, "code": "BadRequest", "error": "invalid json"}),
        };
        line.clear();
        if writer.write_all(resp.to_string().as_bytes()).is_err() || writer.write_all(b"\n").is_err() {
            break;
        }
    }
    debug!(?peer, "rpc client disconnected");
}

struct RpcError {
    code: &'static str,
    message: String,
}

impl From<NodeError> for RpcError {
    fn from(e: NodeError) -> Self {
        RpcError {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<AuthError> for RpcError {
    fn from(e: AuthError) -> Self {
        RpcError {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

fn bad(message: impl Into<String>) -> RpcError {
    RpcError {
        code: "BadRequest",
        message: message.into(),
    }
}

/// Answer one request. Failures come back as `{"ok": false, "code", "error"}`.
///
/// Signed requests are authenticated before the pool is touched; the caller
/// and timestamp of a state-changing call come from the signature and the
/// node clock, never from request fields.
pub fn handle_request(v: Value, auth: &RpcAuth, store: &Mutex<PoolStore>) -> Value {
    if !auth.token_ok(&v) {
        return json!({"ok": false, "code": "Unauthorized", "error": "bad auth token"});
    }
    let method = match v.get("method").and_then(|m| m.as_str()) {
        Some(m) => m,
        None => return json!({"ok": false, "code": "BadRequest", "error": "missing method"}),
    };
    let ctx = if v.get("signature").is_some() {
        match auth.context(&v, unix_now()) {
            Ok(ctx) => Some(ctx),
            Err(e) => return json!({"ok": false, "code": e.code, "error": e.message}),
        }
    } else {
        None
    };
    match dispatch(method, &v, ctx, store) {
        Ok(mut out) => {
            out["ok"] = Value::Bool(true);
            out
        }
        Err(e) => json!({"ok": false, "code": e.code, "error": e.message}),
    }
}

fn dispatch(
    method: &str,
    v: &Value,
    ctx: Option<CallContext>,
    store: &Mutex<PoolStore>,
) -> Result<Value, RpcError> {
    let mut store = store.lock().map_err(|_| RpcError {
        code: "Internal",
        message: "pool lock poisoned".into(),
    })?;

    match method {
        "ping" => Ok(json!({})),

        // ---- views ----
        "get_merkle_root" => Ok(json!({ "root": store.pool().merkle_root() })),
        "is_known_root" => {
            let root = parse_param(v, "root")?;
            Ok(json!({ "accepted": store.pool().is_root_accepted(&root) }))
        }
        "has_commitment" => {
            let cm: Commitment = parse_param(v, "commitment")?;
            let pool = store.pool();
            Ok(json!({
                "exists": pool.has_commitment(&cm),
                "leaf_index": pool.commitment_index(&cm),
            }))
        }
        "is_nullifier_used" => {
            let nf: Nullifier = parse_param(v, "nullifier")?;
            Ok(json!({ "used": store.pool().is_nullifier_used(&nf) }))
        }
        "is_note_spent" => {
            let cm: Commitment = parse_param(v, "commitment")?;
            Ok(json!({ "spent": store.pool().is_note_spent(&cm) }))
        }
        "is_trade_settled" => {
            let digest: Hash32 = parse_param(v, "digest")?;
            Ok(json!({ "settled": store.pool().is_trade_settled(&digest) }))
        }
        "can_complete_deposit" => {
            let who: Address = parse_param(v, "depositor")?;
            Ok(json!({ "ready": store.pool().can_complete_deposit(&who) }))
        }
        "get_pending_deposit" => {
            let who: Address = parse_param(v, "depositor")?;
            let pool = store.pool();
            let deposit = pool.pending_deposit(&who).unwrap_or(PendingDeposit {
                token: TokenId(0),
                amount: 0,
                balance_before: Amount::zero(),
                prepared_at: 0,
                completed: false,
            });
            Ok(json!({ "deposit": deposit, "phase": pool.deposit_phase(&who) }))
        }
        "get_deposit_phase" => {
            let who: Address = parse_param(v, "depositor")?;
            let phase: DepositPhase = store.pool().deposit_phase(&who);
            Ok(json!({ "phase": phase }))
        }
        "get_contract_balance" => {
            let token = TokenId(u64_param(v, "token")?);
            Ok(json!({ "balance": store.pool().contract_balance(token) }))
        }
        "total_deposits" => Ok(json!({ "total": store.pool().total_deposits() })),
        "get_merkle_path" => {
            let pool = store.pool();
            let index = match v.get("commitment") {
                Some(_) => {
                    let cm: Commitment = parse_param(v, "commitment")?;
                    pool.commitment_index(&cm).ok_or_else(|| bad("unknown commitment"))?
                }
                None => u64_param(v, "leaf_index")?,
            };
            let path = pool.merkle_path(index).ok_or_else(|| bad("leaf index out of range"))?;
            Ok(json!({ "path": path, "root": pool.merkle_root() }))
        }
        "get_events" => {
            let from = opt_u64_param(v, "from")?.unwrap_or(0);
            let limit = opt_u64_param(v, "limit")?
                .map(|l| (l as usize).min(MAX_EVENT_LIMIT))
                .unwrap_or(DEFAULT_EVENT_LIMIT);
            let pool = store.pool();
            let events = pool
                .events(from, limit)
                .iter()
                .zip(from..)
                .map(|(ev, seq)| {
                    let id = event_id(seq, ev)?;
                    Ok(json!({ "seq": seq, "id": id, "event": ev }))
                })
                .collect::<Result<Vec<_>, CoreError>>()
                .map_err(|e| RpcError {
                    code: "Internal",
                    message: e.to_string(),
                })?;
            Ok(json!({
                "from": from,
                "events": events,
                "total": pool.event_count(),
            }))
        }
        "attest_ownership" => {
            let cm: Commitment = parse_param(v, "commitment")?;
            let proof = bytes_param(v, "proof")?;
            let pv = bytes_param(v, "public_values")?;
            let nf = store
                .pool()
                .attest_ownership(&cm, &proof, &pv)
                .map_err(NodeError::from)?;
            Ok(json!({ "nullifier_hash": nf }))
        }

        // ---- state-changing ----
        "prepare_deposit" => {
            let ctx = signed(ctx)?;
            let token = TokenId(u64_param(v, "token")?);
            let amount = u64_param(v, "amount")?;
            receipt(store.apply(|p| p.prepare_deposit(&ctx, token, amount)))
        }
        "transfer_to_pool" => {
            let ctx = signed(ctx)?;
            let token = TokenId(u64_param(v, "token")?);
            let amount: Amount = parse_param(v, "amount")?;
            receipt(store.apply(|p| p.transfer_to_pool(&ctx, token, amount)))
        }
        "complete_deposit" => {
            let ctx = signed(ctx)?;
            let cm: Commitment = parse_param(v, "commitment")?;
            let proof = bytes_param(v, "proof")?;
            let pv = bytes_param(v, "public_values")?;
            receipt(store.apply(|p| p.complete_deposit(&ctx, cm, &proof, &pv)))
        }
        "withdraw" => {
            let ctx = signed(ctx)?;
            let nf: Nullifier = parse_param(v, "nullifier")?;
            let recipient: Address = parse_param(v, "recipient")?;
            let token = TokenId(u64_param(v, "token")?);
            let amount: Amount = parse_param(v, "amount")?;
            let proof = bytes_param(v, "proof")?;
            let pv = bytes_param(v, "public_values")?;
            receipt(store.apply(|p| p.withdraw(&ctx, nf, recipient, token, amount, &proof, &pv)))
        }
        "private_spot_trade" => {
            let ctx = signed(ctx)?;
            let proof = bytes_param(v, "proof")?;
            let pv = bytes_param(v, "public_values")?;
            receipt(store.apply(|p| p.private_spot_trade(&ctx, &proof, &pv)))
        }
        "emergency_withdraw" => {
            let ctx = signed(ctx)?;
            let recipient: Address = parse_param(v, "recipient")?;
            let token = TokenId(u64_param(v, "token")?);
            let amount: Amount = parse_param(v, "amount")?;
            let reason = str_param(v, "reason")?.to_string();
            receipt(store.apply(|p| p.emergency_withdraw(&ctx, recipient, token, amount, &reason)))
        }
        "emergency_withdraw_all" => {
            let ctx = signed(ctx)?;
            let recipient: Address = parse_param(v, "recipient")?;
            let reason = str_param(v, "reason")?.to_string();
            receipt(store.apply(|p| p.emergency_withdraw_all(&ctx, recipient, &reason)))
        }
        "register_valid_proof" => {
            let ctx = signed(ctx)?;
            let kind: ProofKind = parse_param(v, "kind")?;
            let proof = bytes_param(v, "proof")?;
            let pv = bytes_param(v, "public_values")?;
            let digest = store.register_valid_proof(&ctx.caller, kind, &pv, &proof)?;
            Ok(json!({ "digest": digest }))
        }
        _ => Err(bad(format!("unknown method {method}"))),
    }
}

fn receipt(res: Result<Receipt, NodeError>) -> Result<Value, RpcError> {
    let r = res?;
    Ok(json!({ "first_seq": r.first_seq, "events": r.events }))
}

fn signed(ctx: Option<CallContext>) -> Result<CallContext, RpcError> {
    ctx.ok_or_else(|| AuthError::Unsigned.into())
}

fn str_param<'a>(v: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    v.get(key)
        .and_then(|p| p.as_str())
        .ok_or_else(|| bad(format!("missing {key}")))
}

fn parse_param<T>(v: &Value, key: &str) -> Result<T, RpcError>
where
    T: FromStr,
    T::Err: Display,
{
    str_param(v, key)?
        .parse()
        .map_err(|e| bad(format!("bad {key}: {e}")))
}

fn opt_u64_param(v: &Value, key: &str) -> Result<Option<u64>, RpcError> {
    match v.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| bad(format!("bad {key}"))),
        Some(Value::String(s)) => s.parse().map(Some).map_err(|_| bad(format!("bad {key}"))),
        Some(_) => Err(bad(format!("bad {key}"))),
    }
}

fn u64_param(v: &Value, key: &str) -> Result<u64, RpcError> {
    opt_u64_param(v, key)?.ok_or_else(|| bad(format!("missing {key}")))
}

fn bytes_param(v: &Value, key: &str) -> Result<Vec<u8>, RpcError> {
    let s = str_param(v, key)?;
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| bad(format!("bad hex in {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{address_of, sign_request};
    use innocence_core::{CompliancePublicValues, U256};
    use innocence_state::{PoolConfig, RootPolicy};
    use innocence_verifier::VerifyingKeys;
    use k256::ecdsa::SigningKey;
    use tempfile::{tempdir, TempDir};

    const AUTHORITY: Address = Address([0xca; 20]);

    struct Node {
        _dir: TempDir,
        auth: RpcAuth,
        store: Mutex<PoolStore>,
    }

    fn key(b: u8) -> SigningKey {
        SigningKey::from_slice(&[b; 32]).unwrap()
    }

    fn admin_key() -> SigningKey {
        key(0xad)
    }

    fn addr(k: &SigningKey) -> String {
        address_of(k.verifying_key()).to_hex()
    }

    fn node() -> Node {
        let dir = tempdir().unwrap();
        let config = PoolConfig {
            admin: address_of(admin_key().verifying_key()),
            compliance_authority: AUTHORITY,
            root_policy: RootPolicy::CurrentOnly,
            keys: VerifyingKeys::devnet(),
        };
        let store = PoolStore::load_or_init(&dir.path().join("pool.db"), config, false).unwrap();
        Node {
            _dir: dir,
            auth: RpcAuth::new(None),
            store: Mutex::new(store),
        }
    }

    impl Node {
        fn call(&self, req: Value) -> Value {
            handle_request(req, &self.auth, &self.store)
        }

        fn signed(&self, k: &SigningKey, mut req: Value) -> Value {
            sign_request(k, &mut req, unix_now() + 60).unwrap();
            self.call(req)
        }
    }

    fn compliance_hex(cm: Commitment, valid_until: U256) -> String {
        hex::encode(
            CompliancePublicValues {
                commitment: cm,
                compliance_authority: AUTHORITY,
                valid_until,
                certificate_hash: Hash32::zero(),
            }
            .encode(),
        )
    }

    /// Prepare and fund a deposit of 100 of token 150 for `user`.
    fn fund(n: &Node, user: &SigningKey) {
        let r = n.signed(user, json!({"method": "prepare_deposit", "token": 150, "amount": 100}));
        assert_eq!(r["ok"], true, "{r}");
        let r = n.signed(user, json!({"method": "transfer_to_pool", "token": 150, "amount": "100"}));
        assert_eq!(r["ok"], true, "{r}");
    }

    #[test]
    fn ping_and_auth() {
        let n = node();
        assert_eq!(n.call(json!({"method": "ping"}))["ok"], true);

        let token = RpcAuth::new(Some("secret".to_string()));
        let denied = handle_request(json!({"method": "ping"}), &token, &n.store);
        assert_eq!(denied["code"], "Unauthorized");
        let allowed = handle_request(json!({"method": "ping", "auth": "secret"}), &token, &n.store);
        assert_eq!(allowed["ok"], true);
    }

    #[test]
    fn unknown_method_and_bad_params() {
        let n = node();
        assert_eq!(n.call(json!({"method": "nope"}))["code"], "BadRequest");
        let r = n.call(json!({"method": "has_commitment", "commitment": "0x12"}));
        assert_eq!(r["ok"], false);
        assert_eq!(r["code"], "BadRequest");
    }

    #[test]
    fn empty_slot_reads_as_zero_deposit() {
        let n = node();
        let r = n.call(json!({"method": "get_pending_deposit", "depositor": addr(&key(1))}));
        assert_eq!(r["ok"], true);
        assert_eq!(r["deposit"]["amount"], 0);
        assert_eq!(r["phase"], "Empty");
    }

    #[test]
    fn state_changes_need_a_signature() {
        let n = node();
        let user = addr(&key(1));
        let r = n.call(json!({"method": "prepare_deposit", "caller": user, "token": 150, "amount": 100}));
        assert_eq!(r["code"], "Unauthorized");
        let r = n.call(json!({"method": "get_deposit_phase", "depositor": user}));
        assert_eq!(r["phase"], "Empty");
    }

    #[test]
    fn deposit_flow_over_rpc() {
        let n = node();
        let user = key(1);
        let cm = Commitment([7; 32]);
        let pv_hex = compliance_hex(cm, U256::from(u64::MAX));

        let r = n.signed(&user, json!({"method": "prepare_deposit", "token": 150, "amount": 100}));
        assert_eq!(r["ok"], true, "{r}");
        assert_eq!(r["events"][0]["type"], "DepositPrepared");
        assert_eq!(r["events"][0]["depositor"], addr(&user));

        let complete = json!({"method": "complete_deposit", "commitment": cm.to_hex(),
                              "proof": "0x01", "public_values": pv_hex});
        let r = n.signed(&user, complete.clone());
        assert_eq!(r["code"], "DepositNotFunded");

        let r = n.signed(&user, json!({"method": "transfer_to_pool", "token": 150, "amount": "100"}));
        assert_eq!(r["ok"], true, "{r}");
        let r = n.call(json!({"method": "get_deposit_phase", "depositor": addr(&user)}));
        assert_eq!(r["phase"], "Funded");

        // unregistered proof is rejected
        let r = n.signed(&user, complete.clone());
        assert_eq!(r["code"], "ProofInvalid");

        let register = json!({"method": "register_valid_proof", "kind": "compliance",
                              "proof": "0x01", "public_values": pv_hex});
        assert_eq!(n.signed(&user, register.clone())["code"], "Unauthorized");
        let r = n.signed(&admin_key(), register);
        assert_eq!(r["ok"], true, "{r}");

        let r = n.signed(&user, complete);
        assert_eq!(r["ok"], true, "{r}");
        assert_eq!(r["events"][0]["type"], "PrivateDeposit");

        let r = n.call(json!({"method": "has_commitment", "commitment": cm.to_hex()}));
        assert_eq!(r["exists"], true);
        assert_eq!(r["leaf_index"], 0);
        assert_eq!(n.call(json!({"method": "total_deposits"}))["total"], 1);
        let r = n.call(json!({"method": "is_note_spent", "commitment": cm.to_hex()}));
        assert_eq!(r["spent"], false);

        let r = n.call(json!({"method": "get_merkle_path", "commitment": cm.to_hex()}));
        assert_eq!(r["ok"], true, "{r}");
        let root = n.call(json!({"method": "get_merkle_root"}))["root"].clone();
        assert_eq!(r["root"], root);

        let r = n.call(json!({"method": "get_events", "from": 1, "limit": 5}));
        assert_eq!(r["total"], 3);
        let events = r["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["seq"], 1);
        assert_eq!(events[1]["event"]["type"], "PrivateDeposit");
        assert_ne!(events[0]["id"], events[1]["id"]);
    }

    #[test]
    fn client_timestamp_is_ignored() {
        let n = node();
        let user = key(1);
        fund(&n, &user);
        let cm = Commitment([7; 32]);
        // Certificate lapsed long before the node clock.
        let pv_hex = compliance_hex(cm, U256::from(1_000u64));
        let r = n.signed(&admin_key(), json!({"method": "register_valid_proof", "kind": "compliance",
                                              "proof": "0x01", "public_values": pv_hex}));
        assert_eq!(r["ok"], true, "{r}");

        let r = n.signed(&user, json!({"method": "complete_deposit", "commitment": cm.to_hex(),
                                       "proof": "0x01", "public_values": pv_hex, "timestamp": 0}));
        assert_eq!(r["code"], "ComplianceExpired");
        let r = n.call(json!({"method": "has_commitment", "commitment": cm.to_hex()}));
        assert_eq!(r["exists"], false);
    }

    #[test]
    fn emergency_requires_admin_signature() {
        let n = node();
        let user = key(1);
        let r = n.signed(&user, json!({"method": "transfer_to_pool", "token": 0, "amount": "5"}));
        assert_eq!(r["ok"], true, "{r}");
        let req = json!({"method": "emergency_withdraw_all", "recipient": addr(&user), "reason": "drill"});

        // Claiming the admin address is not enough.
        let mut claimed = req.clone();
        claimed["caller"] = json!(addr(&admin_key()));
        assert_eq!(n.call(claimed.clone())["code"], "Unauthorized");
        assert_eq!(n.signed(&user, claimed)["code"], "Unauthorized");
        let r = n.call(json!({"method": "get_contract_balance", "token": 0}));
        assert_eq!(r["balance"], json!(Amount::from_u64(5)));

        let r = n.signed(&admin_key(), req);
        assert_eq!(r["ok"], true, "{r}");
        assert_eq!(r["events"][0]["type"], "EmergencyWithdraw");
        let r = n.call(json!({"method": "get_contract_balance", "token": 0}));
        assert_eq!(r["balance"], json!(Amount::zero()));
    }

    #[test]
    fn signed_request_is_accepted_once() {
        let n = node();
        let mut req = json!({"method": "transfer_to_pool", "token": 0, "amount": "5"});
        sign_request(&key(1), &mut req, unix_now() + 60).unwrap();
        assert_eq!(n.call(req.clone())["ok"], true);
        assert_eq!(n.call(req)["code"], "RequestReplayed");
        let r = n.call(json!({"method": "get_contract_balance", "token": 0}));
        assert_eq!(r["balance"], json!(Amount::from_u64(5)));

        let mut stale = json!({"method": "transfer_to_pool", "token": 0, "amount": "5"});
        sign_request(&key(1), &mut stale, unix_now() - 1).unwrap();
        assert_eq!(n.call(stale)["code"], "RequestExpired");
    }
}
