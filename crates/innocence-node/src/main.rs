#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use innocence_core::{Address, PROTOCOL_VERSION};
use innocence_node::{serve_rpc, PoolStore};
use innocence_state::{PoolConfig, RootPolicy};
use innocence_verifier::{ProofKind, VerificationKey, VerifyingKeys};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG: &str = "innocence_node=info,innocence_state=info";

/// Node configuration resolved from CLI/env/defaults.
#[derive(Parser, Debug)]
#[command(name = "innocence-node", version)]
struct Config {
    /// Listen address for the JSON-lines RPC
    #[arg(long = "rpc-listen")]
    rpc_listen: Option<String>,
    /// Path to the pool database (sled)
    #[arg(long = "db")]
    db: Option<PathBuf>,
    /// Token clients must send in the `auth` field
    #[arg(long = "rpc-token")]
    rpc_token: Option<String>,
    /// Address of the key that signs emergency withdrawals and proof registrations
    #[arg(long = "admin")]
    admin: Option<String>,
    /// Address compliance proofs must name as their authority
    #[arg(long = "compliance-authority")]
    compliance_authority: Option<String>,
    /// Number of recent roots accepted in proofs (0 = current root only)
    #[arg(long = "root-history")]
    root_history: Option<usize>,
    /// Compliance circuit verification key
    #[arg(long = "vk-compliance")]
    vk_compliance: Option<String>,
    /// Balance circuit verification key
    #[arg(long = "vk-balance")]
    vk_balance: Option<String>,
    /// Trade circuit verification key
    #[arg(long = "vk-trade")]
    vk_trade: Option<String>,
    /// Ownership circuit verification key
    #[arg(long = "vk-ownership")]
    vk_ownership: Option<String>,
    /// Accept every proof (devnet only)
    #[arg(long = "verifier-always-valid")]
    verifier_always_valid: bool,
}

struct ResolvedConfig {
    rpc_listen: SocketAddr,
    db_path: PathBuf,
    rpc_token: Option<String>,
    pool: PoolConfig,
    always_valid: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG)),
        )
        .init();

    let cfg = resolve_config(Config::parse())?;
    info!(
        version = PROTOCOL_VERSION,
        db = %cfg.db_path.display(),
        admin = %cfg.pool.admin,
        authority = %cfg.pool.compliance_authority,
        policy = ?cfg.pool.root_policy,
        "starting innocence node"
    );
    if cfg.always_valid {
        warn!("verifier accepts every proof; do not run this outside a devnet");
    }

    let store = PoolStore::load_or_init(&cfg.db_path, cfg.pool, cfg.always_valid)
        .with_context(|| format!("opening pool db at {}", cfg.db_path.display()))?;
    let store = Arc::new(Mutex::new(store));

    let handle = serve_rpc(&cfg.rpc_listen.to_string(), cfg.rpc_token, store)
        .with_context(|| format!("binding rpc on {}", cfg.rpc_listen))?;
    handle
        .join()
        .map_err(|_| anyhow!("rpc accept loop panicked"))?;
    Ok(())
}

fn setting(cli: Option<String>, var: &str) -> Option<String> {
    cli.or_else(|| env::var(var).ok())
}

fn resolve_config(cli: Config) -> anyhow::Result<ResolvedConfig> {
    let rpc_listen = setting(cli.rpc_listen, "INNOCENCE_RPC_LISTEN")
        .unwrap_or_else(|| "127.0.0.1:18545".to_string())
        .parse()
        .context("invalid rpc listen address")?;

    let db_path = cli
        .db
        .or_else(|| env::var("INNOCENCE_DB").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("innocence.pool.db"));

    let rpc_token = setting(cli.rpc_token, "INNOCENCE_RPC_TOKEN").filter(|t| !t.is_empty());

    let admin: Address = match setting(cli.admin, "INNOCENCE_ADMIN") {
        Some(a) => a.parse().context("invalid admin address")?,
        None => bail!("admin address required (--admin or INNOCENCE_ADMIN)"),
    };
    let compliance_authority: Address =
        match setting(cli.compliance_authority, "INNOCENCE_COMPLIANCE_AUTHORITY") {
            Some(a) => a.parse().context("invalid compliance authority address")?,
            None => bail!("compliance authority required (--compliance-authority or INNOCENCE_COMPLIANCE_AUTHORITY)"),
        };

    let root_history = cli
        .root_history
        .or_else(|| env::var("INNOCENCE_ROOT_HISTORY").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(0);
    let root_policy = match root_history {
        0 => RootPolicy::CurrentOnly,
        n => RootPolicy::Window(n),
    };

    let devnet = VerifyingKeys::devnet();
    let key = |cli: Option<String>, var: &str, kind: ProofKind| -> anyhow::Result<VerificationKey> {
        match setting(cli, var) {
            Some(k) => k.parse().with_context(|| format!("invalid {kind} verification key")),
            None => Ok(*devnet.for_kind(kind)),
        }
    };
    let keys = VerifyingKeys {
        compliance: key(cli.vk_compliance, "INNOCENCE_VK_COMPLIANCE", ProofKind::Compliance)?,
        balance: key(cli.vk_balance, "INNOCENCE_VK_BALANCE", ProofKind::Balance)?,
        trade: key(cli.vk_trade, "INNOCENCE_VK_TRADE", ProofKind::Trade)?,
        ownership: key(cli.vk_ownership, "INNOCENCE_VK_OWNERSHIP", ProofKind::Ownership)?,
    };

    let always_valid = cli.verifier_always_valid
        || env::var("INNOCENCE_VERIFIER_ALWAYS_VALID")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

    Ok(ResolvedConfig {
        rpc_listen,
        db_path,
        rpc_token,
        pool: PoolConfig {
            admin,
            compliance_authority,
            root_policy,
            keys,
        },
        always_valid,
    })
}
