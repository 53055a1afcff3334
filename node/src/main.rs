//! AgriTrace Node Binary
//!
//! Runs the rate and early-warning schedulers, or a single operation from
//! the command line.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agritrace_common::{CurrencyPair, FarmId, LogNotifier, MemoryStore, SharedNotifier, SharedStore};
use agritrace_node::{Node, NodeConfig, PgStore, WebhookNotifier};

#[derive(Parser, Debug)]
#[command(name = "agritrace-node", version, about = "AgriTrace rate engine and early-warning node")]
struct Cli {
    /// Use the in-memory store instead of Postgres.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the schedulers until interrupted.
    Run,
    /// Refresh every configured pair once.
    RefreshRates,
    /// Look up one rate, e.g. `HBAR/USD`.
    Rate { pair: CurrencyPair },
    /// Convert an amount at the current rate.
    Convert { amount: Decimal, pair: CurrencyPair },
    /// Run one early-warning batch, or a single farm.
    Ews {
        #[arg(long)]
        farm: Option<String>,
    },
    /// Probe every primary rate provider.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = NodeConfig::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {e}"));
    }

    let store = open_store(&config, cli.memory).await?;
    let notifier = build_notifier(&config)?;
    let node = Arc::new(Node::new(config, store, notifier)?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(node).await,
        Command::RefreshRates => {
            let report = node.refresh_rates().await;
            for (pair, result) in &report.results {
                match result {
                    Ok(lookup) => println!("{pair}\t{}\t{}\t{:?}", lookup.rate, lookup.source, lookup.outcome),
                    Err(e) => println!("{pair}\terror\t{e}"),
                }
            }
            Ok(())
        }
        Command::Rate { pair } => {
            let lookup = node.rates().lookup(&pair).await?;
            println!("{pair}\t{}\t{}\t{:?}", lookup.rate, lookup.source, lookup.outcome);
            Ok(())
        }
        Command::Convert { amount, pair } => {
            let conversion = node.rates().convert(amount, &pair).await?;
            println!("{}", serde_json::to_string_pretty(&conversion)?);
            Ok(())
        }
        Command::Ews { farm: Some(farm) } => {
            let outcome = node.ews().run_farm(&FarmId::from(farm)).await?;
            for finding in &outcome.findings {
                println!(
                    "{}\t{}\t{:.2}\t{}",
                    outcome.farm_id, finding.disease, finding.confidence_score, finding.recommended_actions
                );
            }
            info!(
                farm_id = %outcome.farm_id,
                alerts = outcome.alerts.len(),
                persistence_failures = outcome.persistence_failures,
                "Farm evaluated"
            );
            Ok(())
        }
        Command::Ews { farm: None } => {
            let report = node.run_ews().await?;
            for (farm_id, e) in &report.failed {
                println!("{farm_id}\terror\t{e}");
            }
            println!(
                "farms={} failed={} findings={} alerts={}",
                report.farms_processed(),
                report.farms_failed(),
                report.findings(),
                report.alerts()
            );
            Ok(())
        }
        Command::Health => {
            let mut unhealthy = 0;
            for health in node.rates().health_check().await {
                if !health.healthy {
                    unhealthy += 1;
                }
                println!(
                    "{}\t{}\t{}",
                    health.provider,
                    health.probe_pair,
                    health.error.as_deref().unwrap_or("ok")
                );
            }
            if unhealthy > 0 {
                anyhow::bail!("{unhealthy} provider(s) unhealthy");
            }
            Ok(())
        }
    }
}

async fn open_store(config: &NodeConfig, memory: bool) -> anyhow::Result<SharedStore> {
    if memory {
        warn!("Using the in-memory store; nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set (use --memory to run without Postgres)"))?;
    let store = PgStore::connect(url, config.db_max_connections).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

fn build_notifier(config: &NodeConfig) -> anyhow::Result<SharedNotifier> {
    match &config.alert_webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering notifications by webhook");
            Ok(Arc::new(WebhookNotifier::new(url.clone(), Duration::from_secs(10))?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

async fn run(node: Arc<Node>) -> anyhow::Result<()> {
    info!("Starting AgriTrace node");
    node.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    node.stop().await;
    info!("Node shutdown complete");
    Ok(())
}
