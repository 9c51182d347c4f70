//! Commission admin CLI
//!
//! Runs the reconciliation sweep and reporting against the Postgres ledger.
//!
//! # Usage
//!
//! ```bash
//! # Create the ledger tables
//! commission_cli schema
//!
//! # Repair every successful payment
//! commission_cli sweep
//!
//! # Sync the commissions one agent/operator earns on
//! commission_cli sweep --user 6f1c...
//!
//! # Ledger totals, or one user's earnings
//! commission_cli totals [--user 6f1c...]
//!
//! # CSV export to a file (stdout when omitted)
//! commission_cli export --out commissions.csv
//! ```

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use commission_engine::{
    CommissionAggregator, CommissionLedger, CommissionStore, DatabaseManager, EngineConfig,
    HierarchyResolver, ReconciliationSweep,
};

#[derive(Parser)]
#[command(name = "commission_cli")]
#[command(version = "0.1.0")]
#[command(about = "Commission ledger reconciliation and reporting")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the commission tables if missing
    Schema,

    /// Create missing commissions and backfill unresolved ones
    Sweep {
        /// Only payments this agent/operator earns on
        #[arg(long)]
        user: Option<Uuid>,
    },

    /// Print ledger totals as JSON
    Totals {
        /// Earnings of one agent/operator instead of the whole ledger
        #[arg(long)]
        user: Option<Uuid>,
    },

    /// Export the ledger as CSV
    Export {
        /// Output file (stdout if not provided)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Mark the commission of a payment as paid
    MarkPaid { payment_id: Uuid },

    /// Drop a shop's cached operator so it is resolved again
    InvalidateShop { shop_id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,commission_engine=debug".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    let db = DatabaseManager::new(config.database.clone())
        .await
        .context("Failed to connect to database")?;
    let store: Arc<dyn CommissionStore> = Arc::new(db.commission_store());
    let resolver = HierarchyResolver::new(store.clone());
    let ledger = CommissionLedger::new(store.clone());

    match cli.command {
        Commands::Schema => {
            db.apply_schema().await?;
            println!("Schema applied");
        }
        Commands::Sweep { user } => {
            let sweep =
                ReconciliationSweep::new(store.clone(), resolver, ledger, config.sweep.clone());
            let report = match user {
                Some(user_id) => sweep.run_for_user(user_id).await?,
                None => sweep.run().await?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Totals { user } => {
            let aggregator = CommissionAggregator::new(store.clone(), config.export.clone());
            let json = match user {
                Some(user_id) => {
                    let earnings = aggregator.totals_for_user(user_id).await?;
                    serde_json::to_string_pretty(&earnings)?
                }
                None => serde_json::to_string_pretty(&aggregator.totals().await?)?,
            };
            println!("{}", json);
        }
        Commands::Export { out } => {
            let aggregator = CommissionAggregator::new(store.clone(), config.export.clone());
            let rows = match out {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    aggregator.export_to(BufWriter::new(file)).await?
                }
                None => aggregator.export_to(io::stdout().lock()).await?,
            };
            eprintln!("Exported {} commission(s)", rows);
        }
        Commands::MarkPaid { payment_id } => {
            let commission = ledger.mark_paid(payment_id).await?;
            println!("{}", serde_json::to_string_pretty(&commission)?);
        }
        Commands::InvalidateShop { shop_id } => {
            resolver.invalidate(shop_id).await?;
            println!("Cleared cached operator for shop {}", shop_id);
        }
    }

    db.close().await;
    Ok(())
}
