//! Camps grant service: entry point.
//!
//! Serves the grant ledger over a small Axum REST API backed by SQLite.
//! Users send grants from their per-user balance to campaigns; every transfer
//! is validated and committed atomically by [`grant_ledger::GrantLedger`].

mod api;
mod config;
mod db;
mod drive;
mod errors;
mod records;
mod store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use grant_ledger::GrantLedger;
use reqwest::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use store::SqliteLedgerStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url, config.lock_timeout).await?;

    // HTTP client for the document-storage script.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    if config.drive.is_some() {
        info!("Campaign folder provisioning enabled");
    }

    let state = Arc::new(api::ApiState {
        ledger: GrantLedger::new(SqliteLedgerStore::new(pool.clone()), config.retry_policy()),
        pool,
        default_grants: config.default_grants,
        drive: config.drive.clone(),
        client,
    });

    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
