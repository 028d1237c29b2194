#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Innocence node: a sled-backed pool behind a JSON-lines RPC. State-changing
//! calls are signed with secp256k1 keys; the signer is the caller.

pub mod auth;
pub mod pool_store;
pub mod rpc;

pub use auth::{address_of, sign_request, signing_bytes, unix_now, AuthError, ReplayGuard};
pub use pool_store::{DbError, NodeError, NodePool, PoolDb, PoolStore};
pub use rpc::{handle_request, serve_listener, serve_rpc, RpcAuth};
