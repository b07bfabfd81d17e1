use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use fundme::{
    chain::{Chain, ChainError},
    config::{Config, ConfigError},
    oracle::PriceFeed,
    units::{format_ether, parse_ether},
    Traversal, UnitError,
};

#[derive(Parser)]
#[command(name = "fundme", version, about = "Crowdfunding escrow on a simulated development chain")]
struct Cli {
    /// Chain state file
    #[arg(long, global = true, default_value = "fundme.state.json")]
    state: PathBuf,

    /// TOML config; built-in network defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a development chain and deploy the price feed mock and the escrow
    Deploy {
        #[arg(long, default_value = "hardhat")]
        network: String,
        /// Signer index or address of the deployer (becomes owner)
        #[arg(long, default_value = "0")]
        deployer: String,
    },
    /// List signer accounts and balances
    Accounts,
    /// Send value to the escrow
    Fund {
        #[arg(long)]
        from: String,
        /// Amount in native units, e.g. 0.025
        #[arg(long)]
        value: String,
    },
    /// Withdraw everything as the owner
    Withdraw {
        #[arg(long)]
        from: String,
        /// Load the funder list once instead of re-reading its length
        #[arg(long)]
        cheaper: bool,
    },
    /// Publish a new mock price answer (feed decimals)
    Price {
        #[arg(long, allow_negative_numbers = true)]
        answer: i128,
    },
    /// Make an account refuse (or accept again) incoming transfers
    Reject {
        #[arg(long)]
        account: String,
        #[arg(long)]
        off: bool,
    },
    /// Print escrow state
    Show,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("state file {path} is corrupt: {source}")]
    State {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Unit(#[from] UnitError),
}

fn load_state(path: &Path) -> Result<Chain, CliError> {
    let bytes = fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CliError::State {
        path: path.to_path_buf(),
        source,
    })
}

fn save_state(path: &Path, chain: &Chain) -> Result<(), CliError> {
    let json = serde_json::to_vec_pretty(chain).map_err(|source| CliError::State {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn deploy_cmd(cli: &Cli, config: &Config, network: &str, deployer: &str) -> Result<(), CliError> {
    let mut chain = Chain::development(config, network)?;
    let deployer = chain.resolve(deployer)?;
    let report = chain.deploy(config, deployer)?;
    save_state(&cli.state, &chain)?;
    println!("network       {} (chain id {:?})", report.network, report.chain_id);
    println!("price feed    {:?}", report.price_feed);
    println!("escrow        {:?}", report.escrow);
    println!("owner         {:?}", report.owner);
    println!("confirmations {}", report.block_confirmations);
    Ok(())
}

fn accounts_cmd(chain: &Chain) {
    for (index, signer) in chain.signers().iter().enumerate() {
        println!("{index:>2}  {:?}  {}", signer, format_ether(chain.balance_of(signer)));
    }
}

fn show_cmd(chain: &Chain) -> Result<(), CliError> {
    let deployment = chain.escrow()?;
    let escrow = &deployment.contract;
    let feed = chain.price_feed()?;
    let quote = feed.quote().map_err(|err| ChainError::Fund(err.into()))?;
    println!("escrow   {:?}", deployment.address);
    println!("owner    {:?}", escrow.owner());
    println!("feed     {:?} ({} decimals, answer {})", escrow.price_feed(), feed.decimals(), feed.latest_answer());
    println!("balance  {}", format_ether(escrow.balance()));
    println!(
        "minimum  {} ({} USD)",
        format_ether(escrow.policy().minimum_contribution(&quote)),
        format_ether(escrow.policy().minimum_usd)
    );
    println!("digest   {}", hex::encode(escrow.ledger().digest()));
    println!("funders  {}", escrow.funder_count());
    for record in escrow.ledger().records() {
        println!("  {:?}  {}", record.funder, format_ether(record.amount));
    }
    println!("events   {}", escrow.events().len());
    Ok(())
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Deploy { network, deployer } => deploy_cmd(cli, &config, network, deployer)?,
        Command::Accounts => accounts_cmd(&load_state(&cli.state)?),
        Command::Show => show_cmd(&load_state(&cli.state)?)?,
        Command::Fund { from, value } => {
            let mut chain = load_state(&cli.state)?;
            let from = chain.resolve(from)?;
            let value = parse_ether(value)?;
            let admission = chain.fund(from, value)?;
            save_state(&cli.state, &chain)?;
            println!(
                "funded {} from {:?} (≈ {} USD)",
                format_ether(admission.amount),
                from,
                format_ether(admission.usd_value)
            );
        }
        Command::Withdraw { from, cheaper } => {
            let mut chain = load_state(&cli.state)?;
            let from = chain.resolve(from)?;
            let traversal = if *cheaper {
                Traversal::CachedLength
            } else {
                Traversal::Straightforward
            };
            let receipt = chain.withdraw(from, traversal)?;
            save_state(&cli.state, &chain)?;
            println!(
                "{} withdrew {} from {} funders",
                traversal.label(),
                format_ether(receipt.amount),
                receipt.funders.len()
            );
            println!(
                "storage  reads {}  writes {}",
                receipt.storage.reads, receipt.storage.writes
            );
        }
        Command::Price { answer } => {
            let mut chain = load_state(&cli.state)?;
            chain.update_price(*answer)?;
            save_state(&cli.state, &chain)?;
            println!("price feed answer → {answer}");
        }
        Command::Reject { account, off } => {
            let mut chain = load_state(&cli.state)?;
            let account = chain.resolve(account)?;
            chain.set_rejecting(account, !off);
            save_state(&cli.state, &chain)?;
            let mode = if *off { "accepts" } else { "rejects" };
            println!("{:?} now {mode} transfers", account);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
