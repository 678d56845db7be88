use anyhow::Context;
use tracing::{info, Level};

use atm_recon::domain::models::ReconciliationStatus;
use atm_recon::storage::{DbConnection, Repository, TransactionRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let data_dir = atm_recon::config::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let db_path = atm_recon::config::database_path();
    info!("Setting up database at {}", db_path.display());
    let db = DbConnection::init(&atm_recon::config::db_url(&db_path))
        .await
        .context("initializing database")?;

    let transactions = TransactionRepository::new(db);
    let total = transactions.get_count().await?;
    let pending = transactions
        .count_by_status(ReconciliationStatus::Pending)
        .await?;
    let shortages = transactions
        .count_by_status(ReconciliationStatus::Shortage)
        .await?;
    let overs = transactions
        .count_by_status(ReconciliationStatus::Over)
        .await?;
    info!(
        "Database ready: {} transaction(s), {} pending, {} shortage(s), {} over",
        total, pending, shortages, overs
    );

    Ok(())
}
