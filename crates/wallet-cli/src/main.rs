//! wallet-cli - account, send and swap from the terminal.

mod local_wallet;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use chain_eth::address::checksum_address;
use chain_eth::chains::{self, ChainDescriptor};
use clap::{Parser, Subcommand};
use smart_wallet::rpc::{AlchemyConnector, HttpChainReader};
use smart_wallet::swap::availability_notice;
use smart_wallet::{AmountSpec, Refresh, SendOptions, WalletConfig, WalletContext};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::local_wallet::{LocalAuthProvider, LocalEmbeddedWallet};

/// Smart wallet command-line shell
#[derive(Parser, Debug)]
#[command(name = "wallet-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Chain to start on (defaults to WALLET_DEFAULT_CHAIN_ID, then Base)
    #[arg(long, global = true)]
    chain: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Development signing key
    #[arg(long, env = "WALLET_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Show the signer, active chain and balances
    Account,
    /// Send the native asset
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Decimal amount, e.g. 0.01
        #[arg(long)]
        amount: String,
        /// Pay gas from the account instead of the sponsorship policy
        #[arg(long)]
        no_sponsor: bool,
    },
    /// Swap one token for another (mainnet only)
    Swap {
        /// Token to sell, as a symbol or address
        #[arg(long)]
        from: String,
        /// Token to buy, as a symbol or address
        #[arg(long)]
        to: String,
        /// Decimal amount
        #[arg(long)]
        amount: String,
        /// Treat --amount as the minimum to receive instead of the amount to sell
        #[arg(long)]
        min_receive: bool,
        /// Submit without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Switch chains for this run and show the account there. The wallet is
    /// not persisted; use --chain to choose where later runs start.
    SwitchChain {
        /// Chain id, plain or CAIP-2
        chain_id: String,
    },
    /// List supported chains
    Chains,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("smart_wallet=debug,chain_eth=debug,wallet_cli=debug")
    } else {
        EnvFilter::new("smart_wallet=warn,chain_eth=warn,wallet_cli=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.command == Command::Chains {
        print_chains();
        return Ok(());
    }

    let config = WalletConfig::from_env().context("reading wallet configuration")?;
    let start_chain = match args.chain.as_deref() {
        Some(raw) => chains::resolve_str(raw)?,
        None => chains::resolve(config.default_chain_id)?,
    };
    let Some(key) = args.private_key.as_deref() else {
        bail!("no signing key: set WALLET_PRIVATE_KEY or pass --private-key");
    };
    let wallet = LocalEmbeddedWallet::from_hex(key, start_chain.id)?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building HTTP client")?;
    let ctx = WalletContext::new(
        config,
        Arc::new(LocalAuthProvider::new(wallet)),
        Arc::new(AlchemyConnector::new(http.clone())),
        Arc::new(HttpChainReader::new(http)),
    );
    ctx.login().await?;

    let result = run(&ctx, args.command).await;
    ctx.logout().await?;
    result
}

async fn run(ctx: &WalletContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Account => account(ctx).await,
        Command::Send {
            to,
            amount,
            no_sponsor,
        } => {
            let options = if no_sponsor {
                SendOptions::unsponsored()
            } else {
                SendOptions::default()
            };
            let chain = ctx.active_chain().await?;
            let sent = ctx
                .transactions()
                .send_transfer(&to, &amount, options)
                .await?;
            let hash = sent.transaction_hash.to_string();
            println!("Transaction confirmed: {hash}");
            println!("{}", chain.explorer_tx_url(&hash));
            Ok(())
        }
        Command::Swap {
            from,
            to,
            amount,
            min_receive,
            yes,
        } => {
            let amount = if min_receive {
                AmountSpec::MinimumTo(amount)
            } else {
                AmountSpec::ExactFrom(amount)
            };
            swap(ctx, &from, &to, amount, yes).await
        }
        Command::SwitchChain { chain_id } => {
            let target = chains::parse_chain_id(&chain_id)?;
            let chain = ctx.switch_chain(target).await?;
            println!(
                "Switched to {} ({}) for this run; pass --chain {} to start there next time",
                chain.name, chain.id, chain.id
            );
            account(ctx).await
        }
        Command::Chains => {
            print_chains();
            Ok(())
        }
    }
}

async fn account(ctx: &WalletContext) -> anyhow::Result<()> {
    let signer = ctx.session().current_signer().await?;
    let chain = ctx.active_chain().await?;
    println!("Address: {}", checksum_address(&signer.address()));
    println!("Chain:   {} ({})", chain.name, chain.id);

    let balances = match ctx.refresh_balances().await? {
        Refresh::Applied(balances) => balances,
        Refresh::Superseded => bail!("balance refresh was superseded"),
    };
    println!("{:<8}{}", chain.symbol, balances.native.display());
    for token in &balances.tokens {
        println!("{:<8}{}", token.token.symbol, token.balance.display());
    }
    Ok(())
}

async fn swap(
    ctx: &WalletContext,
    from: &str,
    to: &str,
    amount: AmountSpec,
    yes: bool,
) -> anyhow::Result<()> {
    let chain = ctx.active_chain().await?;
    if let Some(notice) = availability_notice(chain) {
        println!("{notice}");
        return Ok(());
    }

    let from_token = resolve_token(chain, from)?;
    let to_token = resolve_token(chain, to)?;
    let prepared = ctx.swaps().prepare(&from_token, &to_token, amount).await?;

    println!(
        "You'll send:          {} {}",
        prepared.display_from_amount(),
        prepared.from_token.symbol
    );
    println!(
        "You'll receive (min): {} {}",
        prepared.display_minimum_to_amount(),
        prepared.to_token.symbol
    );
    println!("Quote expires in {}s", seconds_left(prepared.expiry_secs()));

    if !yes && !confirm("Submit swap?")? {
        ctx.swaps().cancel()?;
        println!("Swap cancelled");
        return Ok(());
    }

    let result = ctx.swaps().submit(&prepared).await?;
    let hash = result.transaction_hash.to_string();
    info!(tx = %hash, "swap submitted");
    println!("Swap confirmed: {hash}");
    println!("{}", chain.explorer_tx_url(&hash));
    Ok(())
}

/// Maps a symbol to its address on `chain`. Anything else is passed through
/// for the swap orchestrator to validate.
fn resolve_token(chain: &ChainDescriptor, input: &str) -> anyhow::Result<String> {
    let input = input.trim();
    if input.starts_with("0x") || input.starts_with("0X") {
        return Ok(input.to_string());
    }
    match chain.token_by_symbol(input) {
        Some(token) => Ok(checksum_address(&token.address)),
        None => bail!("unknown token {input} on {}", chain.name),
    }
}

fn seconds_left(expiry: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    expiry.saturating_sub(now)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn print_chains() {
    for chain in chains::supported_chains() {
        let kind = if chain.is_testnet { "testnet" } else { "mainnet" };
        println!("{:<8}{} ({kind})", chain.id, chain.name);
    }
}
