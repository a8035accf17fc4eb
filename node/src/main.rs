//! Cashdesk Node Binary
//!
//! Connects to Postgres, applies ledger migrations and verifies that every
//! balance agrees with its balance records.

mod config;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cashdesk_ledger::{LedgerEngine, PgStore};

use crate::config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Cashdesk node");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store = PgStore::connect(&config.database_url, config.max_connections).await?;
    store.migrate().await?;

    let engine = LedgerEngine::new(store, config.ledger.clone());
    let report = match engine.verify_integrity().await {
        Ok(report) => report,
        Err(e) => {
            error!(code = e.error_code(), error = %e, "Integrity check failed");
            return Err(e.into());
        }
    };

    if report.is_clean() {
        info!(
            balances = report.balances_checked,
            records = report.records_checked,
            "Ledger is consistent"
        );
    } else {
        warn!(
            report = %serde_json::to_string(&report)?,
            "Ledger has discrepancies"
        );
        anyhow::bail!(
            "{} balance discrepancies found",
            report.discrepancies.len()
        );
    }

    info!("Cashdesk node finished");
    Ok(())
}
