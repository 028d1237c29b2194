use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use innocence_core::{
    Address, Amount, BalancePublicValues, CompliancePublicValues, Hash32, Nullifier, TokenId, U256,
};
use innocence_node::{serve_listener, PoolStore};
use innocence_state::{PoolConfig, RootPolicy};
use innocence_verifier::VerifyingKeys;
use innocence_wallet::{NoteStatus, RpcClient, RpcFailure, Wallet};
use serde_json::json;
use tempfile::tempdir;

const AUTHORITY: Address = Address([0xca; 20]);

fn spawn_node(dir: &std::path::Path) -> String {
    let config = PoolConfig {
        admin: Address([0xad; 20]),
        compliance_authority: AUTHORITY,
        root_policy: RootPolicy::CurrentOnly,
        keys: VerifyingKeys::devnet(),
    };
    let store = PoolStore::load_or_init(&dir.join("pool.db"), config, true).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    serve_listener(listener, Some("t".into()), Arc::new(Mutex::new(store)));
    addr.to_string()
}

#[test]
fn deposit_then_withdraw_through_the_node() {
    let dir = tempdir().unwrap();
    let rpc = RpcClient::new(&spawn_node(dir.path()), Some("t".into()));
    let wallet = Wallet::open(&dir.path().join("wallet.db")).unwrap();

    let me = wallet.init("pw").unwrap();
    let signer = wallet.signer("pw").unwrap();

    let rec = wallet.new_note(TokenId(150), 100, "pw").unwrap();
    let cm = rec.commitment;
    rpc.prepare_deposit(&signer, rec.token, rec.amount).unwrap();
    assert_eq!(rpc.deposit_phase(&me).unwrap(), "Prepared");
    rpc.transfer_to_pool(&signer, rec.token, rec.amount).unwrap();
    assert_eq!(rpc.deposit_phase(&me).unwrap(), "Funded");

    let compliance = CompliancePublicValues {
        commitment: cm,
        compliance_authority: AUTHORITY,
        valid_until: U256::from(u64::MAX),
        certificate_hash: Hash32::zero(),
    }
    .encode();
    rpc.complete_deposit(&signer, &cm, b"proof", &compliance).unwrap();
    let leaf = rpc.commitment_index(&cm).unwrap();
    assert_eq!(leaf, Some(0));
    wallet.mark_deposited(&cm, leaf).unwrap();

    let (path, root) = rpc.merkle_path(&cm).unwrap();
    assert!(path.verify(&cm, &root));
    assert_eq!(rpc.merkle_root().unwrap(), root);

    let note = wallet.reveal(&cm, "pw").unwrap();
    let nf = note.nullifier_hash();
    let balance = BalancePublicValues {
        commitment: cm,
        merkle_root: root,
        min_balance: Amount::from_u64(100),
        asset_id: TokenId(150),
    }
    .encode();
    let recipient = Address([0x02; 20]);
    rpc.withdraw(&signer, &nf, &recipient, note.token, Amount::from_u64(60), b"proof", &balance)
        .unwrap();
    wallet.mark_spent(&cm).unwrap();
    assert!(rpc.is_nullifier_used(&nf).unwrap());
    assert!(rpc.is_note_spent(&cm).unwrap());
    assert_eq!(wallet.get(&cm).unwrap().status, NoteStatus::Spent);

    let err = rpc
        .withdraw(&signer, &nf, &recipient, note.token, Amount::from_u64(10), b"proof", &balance)
        .unwrap_err();
    let failure = err.downcast_ref::<RpcFailure>().unwrap();
    assert_eq!(failure.code, "DoubleSpend");

    // a fresh nullifier does not revive the spent note
    let err = rpc
        .withdraw(&signer, &Nullifier([0x33; 32]), &recipient, note.token, Amount::from_u64(10), b"proof", &balance)
        .unwrap_err();
    assert_eq!(err.downcast_ref::<RpcFailure>().unwrap().code, "DoubleSpend");
}

#[test]
fn unsigned_state_change_is_refused() {
    let dir = tempdir().unwrap();
    let rpc = RpcClient::new(&spawn_node(dir.path()), Some("t".into()));
    let err = rpc
        .call("prepare_deposit", json!({"caller": Address([0x01; 20]).to_hex(), "token": 150, "amount": 100}))
        .unwrap_err();
    assert_eq!(err.downcast_ref::<RpcFailure>().unwrap().code, "Unauthorized");
}

#[test]
fn wrong_auth_token_is_refused() {
    let dir = tempdir().unwrap();
    let addr = spawn_node(dir.path());
    let bad = RpcClient::new(&addr, Some("x".into()));
    let err = bad.merkle_root().unwrap_err();
    assert_eq!(err.downcast_ref::<RpcFailure>().unwrap().code, "Unauthorized");
    let good = RpcClient::new(&addr, Some("t".into()));
    assert_eq!(good.merkle_root().unwrap(), innocence_state::IncrementalMerkleTree::new().root());
}
