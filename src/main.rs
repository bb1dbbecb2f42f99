//! txforge command line
//!
//! Thin front end over the library: account validation, fee tiers and
//! blockhash lookup against a configured RPC endpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use txforge::analysis::{ComputeUnitAnalyzer, FeeEstimate};
use txforge::config::Config;
use txforge::metrics::metrics;
use txforge::rpc::{NetworkClient, RpcNetworkClient};
use txforge::validation::{AccountValidator, ValidationResult};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when absent)
    #[arg(short, long, env = "TXFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics after the command
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check existence, balance and ownership of accounts
    Validate {
        addresses: Vec<Pubkey>,

        /// Expected owner, as ADDRESS=OWNER (repeatable)
        #[arg(long = "owner", value_parser = parse_owner_pair)]
        owners: Vec<(Pubkey, Pubkey)>,
    },
    /// Priority fee tiers for a compute budget
    Fees {
        #[arg(long)]
        units: u64,

        #[arg(long, default_value_t = 1)]
        signatures: u64,

        /// Writable accounts to scope the fee sample to
        #[arg(long = "account")]
        accounts: Vec<Pubkey>,
    },
    /// Fetch the latest blockhash
    Blockhash,
}

fn parse_owner_pair(raw: &str) -> Result<(Pubkey, Pubkey), String> {
    let (address, owner) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ADDRESS=OWNER, got '{}'", raw))?;
    let address = address.parse().map_err(|e| format!("bad address: {}", e))?;
    let owner = owner.parse().map_err(|e| format!("bad owner: {}", e))?;
    Ok((address, owner))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs);

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(endpoint = %config.rpc.url, commitment = %config.rpc.commitment, "txforge {}", env!("CARGO_PKG_VERSION"));

    let network: Arc<dyn NetworkClient> = Arc::new(RpcNetworkClient::new(&config.rpc));

    let outcome = match &args.command {
        Command::Validate { addresses, owners } => {
            run_validate(&config, network, addresses, owners, args.json).await
        }
        Command::Fees {
            units,
            signatures,
            accounts,
        } => run_fees(&config, network, *units, *signatures, accounts, args.json).await,
        Command::Blockhash => {
            let blockhash = network
                .get_latest_blockhash(config.rpc.commitment)
                .await
                .context("Failed to fetch blockhash")?;
            println!("{}", blockhash);
            Ok(())
        }
    };

    if args.metrics {
        print!("{}", metrics().render()?);
    }
    outcome
}

async fn run_validate(
    config: &Config,
    network: Arc<dyn NetworkClient>,
    addresses: &[Pubkey],
    owners: &[(Pubkey, Pubkey)],
    json: bool,
) -> Result<()> {
    if addresses.is_empty() {
        anyhow::bail!("no addresses given");
    }
    let validator = AccountValidator::with_cache_config(network, &config.cache.validation);
    let expected: HashMap<Pubkey, Pubkey> = owners.iter().copied().collect();
    let result = validator
        .validate(addresses, &config.validation, &[], &expected)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_validation(&result);
    }

    if !result.success {
        anyhow::bail!("{} account(s) failed validation", result.invalid_accounts().len());
    }
    Ok(())
}

fn print_validation(result: &ValidationResult) {
    for status in &result.statuses {
        let verdict = if status.is_valid { "ok" } else { "INVALID" };
        println!(
            "{:<44} {:<8} lamports={} data={}B",
            status.address, verdict, status.lamports, status.data_length
        );
        for error in &status.errors {
            println!("    error: {}", error);
        }
        for warning in &status.warnings {
            println!("    warning: {:?}", warning);
        }
    }
    for warning in &result.dependency_warnings {
        println!("dependency warning: {:?}", warning);
    }
}

async fn run_fees(
    config: &Config,
    network: Arc<dyn NetworkClient>,
    units: u64,
    signatures: u64,
    accounts: &[Pubkey],
    json: bool,
) -> Result<()> {
    let analyzer = ComputeUnitAnalyzer::new(config.fees.clone()).with_network(network);
    let estimate = analyzer
        .estimate(units, signatures, accounts)
        .await
        .context("Failed to fetch prioritization fees")?;

    if estimate.sample_count == 0 {
        warn!("No recent prioritization fees reported; tiers are zero");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
    } else {
        print_fees(&estimate);
    }
    Ok(())
}

fn print_fees(estimate: &FeeEstimate) {
    println!(
        "congestion={:?} samples={} limit={}{}",
        estimate.congestion,
        estimate.sample_count,
        estimate.budget.compute_unit_limit,
        if estimate.budget.clamped { " (clamped)" } else { "" }
    );
    for tier in &estimate.tiers {
        println!(
            "{:<9} {:>12} µL/CU  priority={:>10}  total={:>10} lamports",
            tier.kind.to_string(),
            tier.micro_lamports_per_cu,
            tier.priority_fee_lamports,
            tier.total_fee_lamports
        );
    }
}

/// Initialize structured logging (stderr, so stdout stays parseable)
fn init_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        "txforge=debug,info"
    } else {
        "txforge=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
