#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use innocence_core::{Address, Amount, Commitment, TokenId};
use innocence_wallet::{NoteStatus, RpcClient, Wallet};
use rpassword::prompt_password;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "innocence-wallet", version)]
struct Cli {
    #[arg(long, default_value = "innocence.wallet.db")]
    wallet_db: PathBuf,
    /// Node RPC address
    #[arg(long, env = "INNOCENCE_RPC", default_value = "127.0.0.1:18545")]
    rpc: String,
    /// Node RPC auth token
    #[arg(long, env = "INNOCENCE_RPC_TOKEN")]
    rpc_token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the signing key the wallet acts with on the pool
    Init,
    /// Print the wallet's pool address
    Address,
    /// Create a note and store it sealed
    NewNote {
        #[arg(long)]
        token: u64,
        #[arg(long)]
        amount: u64,
    },
    /// List stored notes
    List,
    /// Stage the deposit of a pending note
    DepositPrepare {
        #[arg(long)]
        commitment: String,
    },
    /// Fund the staged deposit
    DepositFund {
        #[arg(long)]
        commitment: String,
    },
    /// Complete the deposit with a compliance proof
    DepositComplete {
        #[arg(long)]
        commitment: String,
        #[arg(long)]
        proof: String,
        #[arg(long)]
        public_values: String,
    },
    /// Withdraw from a deposited note with a balance proof
    Withdraw {
        #[arg(long)]
        commitment: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        proof: String,
        #[arg(long)]
        public_values: String,
    },
    /// Local and pool-side status of a note
    Status {
        #[arg(long)]
        commitment: String,
    },
    /// Current pool root
    Root,
}

fn parse_hex(s: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).with_context(|| format!("invalid hex in {what}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("innocence_wallet=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let wallet = Wallet::open(&cli.wallet_db)?;
    let rpc = RpcClient::new(&cli.rpc, cli.rpc_token.clone());

    match cli.command {
        Commands::Init => {
            let pwd = prompt_password("Wallet password: ")?;
            let address = wallet.init(&pwd)?;
            wallet.flush()?;
            info!(%address, "wallet initialized");
            println!("{address}");
        }
        Commands::Address => {
            println!("{}", wallet.address()?);
        }
        Commands::NewNote { token, amount } => {
            let pwd = prompt_password("Wallet password: ")?;
            let rec = wallet.new_note(TokenId(token), amount, &pwd)?;
            wallet.flush()?;
            println!("{}", rec.commitment);
        }
        Commands::List => {
            for rec in wallet.list()? {
                let leaf = rec
                    .leaf_index
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{} token={} amount={} status={} leaf={}",
                    rec.commitment, rec.token, rec.amount, rec.status, leaf
                );
            }
        }
        Commands::DepositPrepare { commitment } => {
            let rec = wallet.get(&commitment.parse()?)?;
            let signer = wallet.signer(&prompt_password("Wallet password: ")?)?;
            rpc.prepare_deposit(&signer, rec.token, rec.amount)?;
            info!(commitment = %rec.commitment, "deposit prepared");
            println!("prepared {} of token {}", rec.amount, rec.token);
        }
        Commands::DepositFund { commitment } => {
            let rec = wallet.get(&commitment.parse()?)?;
            let signer = wallet.signer(&prompt_password("Wallet password: ")?)?;
            rpc.transfer_to_pool(&signer, rec.token, rec.amount)?;
            println!("phase: {}", rpc.deposit_phase(&wallet.address()?)?);
        }
        Commands::DepositComplete {
            commitment,
            proof,
            public_values,
        } => {
            let cm: Commitment = commitment.parse()?;
            let rec = wallet.get(&cm)?;
            if rec.status != NoteStatus::Pending {
                return Err(anyhow!("note is {}, expected pending", rec.status));
            }
            let proof = parse_hex(&proof, "proof")?;
            let pv = parse_hex(&public_values, "public values")?;
            let signer = wallet.signer(&prompt_password("Wallet password: ")?)?;
            rpc.complete_deposit(&signer, &cm, &proof, &pv)?;
            let leaf = rpc.commitment_index(&cm)?;
            wallet.mark_deposited(&cm, leaf)?;
            wallet.flush()?;
            info!(commitment = %cm, ?leaf, "deposit completed");
            println!("deposited at leaf {}", leaf.map(|i| i.to_string()).unwrap_or_default());
        }
        Commands::Withdraw {
            commitment,
            recipient,
            amount,
            proof,
            public_values,
        } => {
            let cm: Commitment = commitment.parse()?;
            let recipient: Address = recipient.parse().context("invalid recipient")?;
            let amount: Amount = amount.parse()?;
            let proof = parse_hex(&proof, "proof")?;
            let pv = parse_hex(&public_values, "public values")?;
            let pwd = prompt_password("Wallet password: ")?;
            let note = wallet.reveal(&cm, &pwd)?;
            let signer = wallet.signer(&pwd)?;
            let nf = note.nullifier_hash();
            rpc.withdraw(&signer, &nf, &recipient, note.token, amount, &proof, &pv)?;
            wallet.mark_spent(&cm)?;
            wallet.flush()?;
            info!(commitment = %cm, nullifier = %nf, %amount, "withdrawn");
            println!("withdrew {amount} to {recipient}");
        }
        Commands::Status { commitment } => {
            let cm: Commitment = commitment.parse()?;
            let rec = wallet.get(&cm)?;
            println!("local status: {}", rec.status);
            match rpc.commitment_index(&cm)? {
                Some(i) => println!("in pool at leaf {i}"),
                None => println!("not in pool"),
            }
            if rec.status != NoteStatus::Pending {
                let pwd = prompt_password("Wallet password: ")?;
                let note = wallet.reveal(&cm, &pwd)?;
                println!("nullifier used: {}", rpc.is_nullifier_used(&note.nullifier_hash())?);
                println!("note spent: {}", rpc.is_note_spent(&cm)?);
            }
            if let Ok(address) = wallet.address() {
                println!("deposit slot of {address}: {}", rpc.deposit_phase(&address)?);
            }
        }
        Commands::Root => {
            println!("{}", rpc.merkle_root()?);
        }
    }

    Ok(())
}
