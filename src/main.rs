// src/main.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::types::Address;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gasless_account::{
    acquire_signer, ChainClient, ChainDescriptor, Eip1193Wallet, LocalWalletProvider,
    SmartAccountBinder, SmartAccountSession, SponsorOptions, TransactionRequest, WalletProvider,
};

const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON chain descriptor; Avalanche C-Chain when omitted
    #[clap(long)]
    chain_config: Option<PathBuf>,

    /// JSON-RPC wallet answering eth_requestAccounts / personal_sign.
    /// Falls back to the PRIVATE_KEY environment variable.
    #[clap(long)]
    wallet_rpc_url: Option<String>,

    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the smart account bound to the wallet's first account
    Address,

    /// Native balance of an address, or of the bound smart account
    Balance {
        #[clap(short, long)]
        address: Option<String>,
    },

    /// Send a sponsored transaction (or a batch from a JSON file)
    Send {
        #[clap(long, required_unless_present = "batch")]
        to: Option<String>,

        /// Amount in the smallest native unit (decimal or 0x hex)
        #[clap(long, default_value = "0")]
        value: String,

        #[clap(long)]
        data: Option<String>,

        /// JSON array of {to, value, data} requests
        #[clap(long, conflicts_with = "to")]
        batch: Option<PathBuf>,

        /// Wait for the receipt before exiting
        #[clap(short, long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let chain = Arc::new(match &args.chain_config {
        Some(path) => ChainDescriptor::from_json_file(path)?,
        None => ChainDescriptor::avalanche(),
    });
    info!("Using chain {} ({})", chain.name, chain.id);

    match &args.command {
        Command::Address => {
            let session = bind(&args, chain.clone()).await?;
            println!("{:?}", session.smart_account_address());
            println!("{}", chain.explorer_address_url(session.smart_account_address()));
        }
        Command::Balance { address } => {
            let address = match address {
                Some(address) => address
                    .parse::<Address>()
                    .with_context(|| format!("invalid address {}", address))?,
                None => bind(&args, chain.clone()).await?.smart_account_address(),
            };
            let client = ChainClient::new(chain.clone())?;
            let balance = client.get_balance(address).await;
            println!("{} {}", balance, chain.native_currency.symbol);
        }
        Command::Send {
            to,
            value,
            data,
            batch,
            wait,
        } => {
            let requests = match (batch, to) {
                (Some(path), _) => read_batch(path)?,
                (None, Some(to)) => vec![TransactionRequest::parse(to, value, data.as_deref())?],
                (None, None) => anyhow::bail!("either --to or --batch is required"),
            };

            let session = bind(&args, chain.clone()).await?;
            let mut handle = session
                .submit(requests, Some(SponsorOptions::default()))
                .await?;
            println!("user operation: {:?}", handle.user_op_hash());

            let tx_hash = handle.wait_for_tx_hash().await?;
            println!("transaction: {}", chain.explorer_tx_url(tx_hash));

            if *wait {
                let result = handle.wait().await?;
                if result.is_reverted() {
                    anyhow::bail!("user operation reverted in {:?}", result.hash);
                }
                println!("confirmed: {:?}", result.hash);
            }
        }
    }

    Ok(())
}

async fn bind(args: &Args, chain: Arc<ChainDescriptor>) -> anyhow::Result<SmartAccountSession> {
    let signer = acquire_signer(wallet_provider(args)?).await?;
    let binder = SmartAccountBinder::from_env(chain);
    Ok(binder.bind_smart_account(signer).await?)
}

fn wallet_provider(args: &Args) -> anyhow::Result<Option<Arc<dyn WalletProvider>>> {
    let provider: Arc<dyn WalletProvider> = if let Some(url) = &args.wallet_rpc_url {
        Arc::new(Eip1193Wallet::connect(url)?)
    } else if let Ok(key) = std::env::var(PRIVATE_KEY_ENV) {
        Arc::new(LocalWalletProvider::from_private_key(&key)?)
    } else {
        return Ok(None);
    };
    Ok(Some(provider))
}

fn read_batch(path: &Path) -> anyhow::Result<Vec<TransactionRequest>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read batch file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid batch file {}", path.display()))
}
