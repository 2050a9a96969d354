//! Tier Sale Bot
//!
//! Entry point: loads the configuration and account file, prepares every
//! account and buys the configured tiers once the sale opens.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tier_sale_bot::countdown::CountdownReporter;
use tier_sale_bot::metrics::metrics;
use tier_sale_bot::policy::COUNTDOWN_INTERVAL;
use tier_sale_bot::tiers::TierCatalog;
use tier_sale_bot::{accounts, Config, EvmGateway, PurchaseOrchestrator, SystemClock};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Account file; overrides `accounts.file` from the configuration
    #[arg(short, long)]
    accounts: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics when the run ends
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs)?;
    install_panic_hook();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tier sale bot");

    let config = Config::from_file_with_env(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    config.validate().context("Invalid configuration")?;
    let policy = Arc::new(config.purchase_policy()?);

    let accounts_path = args.accounts.unwrap_or_else(|| config.accounts.file.clone());
    let catalog = TierCatalog::builtin();
    let jobs = accounts::load_accounts(&accounts_path, &catalog)
        .with_context(|| format!("Failed to load accounts from {}", accounts_path.display()))?;

    for job in &jobs {
        info!(
            account = %job.address(),
            tiers = %job.range(),
            quantity = job.quantity(),
            "Account loaded"
        );
    }

    let gateway = Arc::new(
        EvmGateway::new(
            &config.chain.endpoints,
            config.chain.chain_id,
            config.stall_timeout(),
            config.fee_settings()?,
        )?
        .with_gas_limit(config.chain.gas_limit)
        .with_receipt_poll_interval(config.receipt_poll_interval()),
    );
    let release_at = Utc
        .timestamp_millis_opt(policy.release_at_ms as i64)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    info!(
        accounts = jobs.len(),
        endpoints = gateway.endpoint_count(),
        chain_id = config.chain.chain_id,
        stop_on_first_purchase = policy.stop_on_first_purchase,
        %release_at,
        "Configuration loaded"
    );

    let clock = Arc::new(SystemClock);
    let countdown = CountdownReporter::spawn(Arc::clone(&clock), policy.release_at_ms, COUNTDOWN_INTERVAL);
    let orchestrator = PurchaseOrchestrator::new(gateway, clock, policy);

    tokio::select! {
        summary = orchestrator.run(jobs) => {
            countdown.stop();
            summary.log();
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, exiting without waiting for pending jobs");
            countdown.stop();
        }
    }

    if args.print_metrics {
        println!("{}", metrics().render()?);
    }

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "tier_sale_bot=debug,info"
    } else {
        "tier_sale_bot=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Route panics through tracing so they land in the same log stream.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        error!(%location, %message, "Unexpected fault");
    }));
}
